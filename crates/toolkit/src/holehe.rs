// Holehe - which sites an email address is registered on

use crate::text::{content_lines, strip_ansi};
use crate::ScannerDef;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "holehe";

pub static DEF: ScannerDef = ScannerDef {
    name: "HoleheScanner",
    description: "Check which online services an email address is registered with.",
    default_timeout: Duration::from_secs(300),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: None,
};

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct HoleheReport {
    pub email: String,
    pub used: Vec<String>,
    pub not_used: Vec<String>,
    pub rate_limited: Vec<String>,
    pub errors: Vec<String>,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![ArgSpec::required("email", ArgKind::String, "Email address to look up").with(Constraint::Email)]
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    CommandSpec::new(PROGRAM)
        .arg(args.str("email").unwrap_or_default())
        .arg("--no-color")
        .arg("--no-clear")
}

/// Lines look like `[+] twitter.com`; the marker gives the verdict
pub fn parse_output(args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let stdout = strip_ansi(&output.stdout);
    let mut report = HoleheReport {
        email: args.str("email").unwrap_or_default().to_string(),
        ..HoleheReport::default()
    };
    let mut recognized = false;

    for line in content_lines(&stdout) {
        // legend: "[+] Email used, [-] Email not used, ..."
        if line.contains("Email used") {
            recognized = true;
            continue;
        }
        let (Some(marker), Some(site)) = (line.get(..3), line.get(3..)) else {
            continue;
        };
        let site = site.trim().to_string();
        let bucket = match marker {
            "[+]" => &mut report.used,
            "[-]" => &mut report.not_used,
            "[x]" => &mut report.rate_limited,
            "[!]" => &mut report.errors,
            _ => continue,
        };
        recognized = true;
        if !site.is_empty() {
            bucket.push(site);
        }
    }

    if !recognized {
        return Err(ParseError::Unrecognized("no holehe result lines".into()));
    }
    Ok(serde_json::to_value(report)?)
}
