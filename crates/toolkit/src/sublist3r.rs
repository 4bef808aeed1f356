// Sublist3r - subdomain enumeration through search engines

use crate::text::{content_lines, strip_ansi};
use crate::ScannerDef;
use regex::RegexBuilder;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "sublist3r";

pub static DEF: ScannerDef = ScannerDef {
    name: "Sublist3rScanner",
    description: "Enumerate subdomains of a domain through public search engines with Sublist3r.",
    default_timeout: Duration::from_secs(900),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: Some(result_file_name),
};

/// Shared shape of subdomain listings (Sublist3r and crt.sh)
#[derive(Debug, Serialize, PartialEq)]
pub struct SubdomainReport {
    pub domain: String,
    pub subdomains: Vec<String>,
    pub count: usize,
}

impl SubdomainReport {
    pub fn new(domain: impl Into<String>, subdomains: Vec<String>) -> Self {
        Self {
            domain: domain.into(),
            count: subdomains.len(),
            subdomains,
        }
    }
}

pub fn schema() -> Vec<ArgSpec> {
    vec![ArgSpec::required("domain", ArgKind::String, "Domain to enumerate").with(Constraint::Domain)]
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    CommandSpec::new(PROGRAM)
        .arg("-d")
        .arg(args.str("domain").unwrap_or_default())
        .arg("-n")
}

pub fn parse_output(args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let domain = args.str("domain").unwrap_or_default().to_ascii_lowercase();
    let hostname = RegexBuilder::new(&format!(r"^(?:[a-z0-9_-]+\.)*{}$", regex::escape(&domain)))
        .case_insensitive(true)
        .build()
        .map_err(|e| ParseError::Unrecognized(e.to_string()))?;

    let stdout = strip_ansi(&output.stdout);
    let mut recognized = false;
    let mut found = BTreeSet::new();
    for line in content_lines(&stdout) {
        if line.contains("Enumerating subdomains") || line.contains("Total Unique Subdomains") {
            recognized = true;
        } else if hostname.is_match(line) {
            found.insert(line.to_ascii_lowercase());
        }
    }

    if !recognized && found.is_empty() {
        return Err(ParseError::Unrecognized("no Sublist3r progress or results".into()));
    }
    let report = SubdomainReport::new(domain, found.into_iter().collect());
    Ok(serde_json::to_value(report)?)
}

fn result_file_name(args: &ValidatedArgs) -> String {
    format!("{}_subdomains.json", args.str("domain").unwrap_or("domain"))
}
