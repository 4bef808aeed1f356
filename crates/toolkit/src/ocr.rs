// OCR - text extraction from images and PDFs with tesseract
// tesseract reads one image per file, so a PDF is first rendered by ghostscript
// into a multi-page TIFF in the scratch folder.

use crate::ScannerDef;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "tesseract";

pub const PDF_RASTERIZER: &str = "gs";

const PAGES_FILE: &str = "pages.tif";

pub static DEF: ScannerDef = ScannerDef {
    name: "OcrScanner",
    description: "Extract text from an image file, a local PDF or an image URL with tesseract OCR.",
    default_timeout: Duration::from_secs(180),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: None,
};

#[derive(Debug, Serialize, PartialEq)]
pub struct OcrReport {
    pub source: String,
    pub text: String,
    pub characters: usize,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![ArgSpec::required(
        "file_path",
        ArgKind::String,
        "Image or PDF path, http(s) image URL, or @-prefixed URL",
    )
    .with(Constraint::OcrSource)]
}

/// `@https://…` is accepted for compatibility and means the bare URL
fn source(args: &ValidatedArgs) -> &str {
    let raw = args.str("file_path").unwrap_or_default();
    raw.strip_prefix('@').unwrap_or(raw)
}

fn is_pdf(source: &str) -> bool {
    std::path::Path::new(source)
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let source = source(args);
    if !is_pdf(source) {
        return CommandSpec::new(PROGRAM).arg(source).arg("stdout");
    }

    let mut rasterize = CommandSpec::new(PDF_RASTERIZER)
        .arg("-q")
        .arg("-dSAFER")
        .arg("-dBATCH")
        .arg("-dNOPAUSE")
        .arg("-sDEVICE=tiffgray")
        .arg("-r300");
    rasterize.push_scratch("-sOutputFile=", PAGES_FILE);
    rasterize.push_pair("-f", source);

    let mut command = CommandSpec::new(PROGRAM).with_setup(rasterize);
    command.push_scratch("", PAGES_FILE);
    command.push("stdout");
    command
}

fn trim_page(text: &str) -> &str {
    text.trim_matches(['\n', '\r', '\u{c}', ' '])
}

/// One `=== Page N ===` section per page; tesseract ends each page with a form feed
fn pages_text(stdout: &str) -> String {
    let body = stdout.trim_end_matches(['\n', '\r', ' ']);
    let body = body.strip_suffix('\u{c}').unwrap_or(body);
    if body.trim().is_empty() {
        return String::new();
    }
    body.split('\u{c}')
        .enumerate()
        .map(|(i, page)| format!("=== Page {} ===\n{}", i + 1, trim_page(page)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn parse_output(args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let source = source(args);
    let text = if is_pdf(source) {
        pages_text(&output.stdout)
    } else {
        trim_page(&output.stdout).to_string()
    };
    let report = OcrReport {
        source: source.to_string(),
        characters: text.chars().count(),
        text,
    };
    Ok(serde_json::to_value(report)?)
}
