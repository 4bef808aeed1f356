// crt.sh - subdomains from certificate transparency logs (queried with curl)

use crate::sublist3r::SubdomainReport;
use crate::ScannerDef;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "curl";
pub const ENDPOINT: &str = "https://crt.sh/";

pub static DEF: ScannerDef = ScannerDef {
    name: "CrtshScanner",
    description: "Discover subdomains of a domain from certificate transparency logs (crt.sh).",
    default_timeout: Duration::from_secs(150),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::Fail,
    result_file_name: Some(result_file_name),
};

/// The one field used from each crt.sh certificate entry
#[derive(Debug, Deserialize)]
struct CertificateEntry {
    #[serde(default)]
    name_value: String,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![ArgSpec::required("target", ArgKind::String, "Domain to look up, e.g. example.com").with(Constraint::Domain)]
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let target = args.str("target").unwrap_or_default();
    CommandSpec::new(PROGRAM)
        .arg("--silent")
        .arg("--show-error")
        .arg("--fail")
        .arg("--max-time")
        .arg("120")
        .arg("--get")
        .arg("--data-urlencode")
        .arg(format!("q={target}"))
        .arg("--data")
        .arg("output=json")
        .arg(ENDPOINT)
}

pub fn parse_output(args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let target = args.str("target").unwrap_or_default();
    let entries: Vec<CertificateEntry> = serde_json::from_str(output.stdout.trim())?;
    let pattern = Regex::new(&format!(r"[^.]+\.{}\b", regex::escape(target)))
        .map_err(|e| ParseError::Unrecognized(e.to_string()))?;

    let mut seen = HashSet::new();
    let subdomains: Vec<String> = entries
        .iter()
        .flat_map(|entry| entry.name_value.split('\n'))
        .map(str::trim)
        .filter(|name| !name.is_empty() && pattern.is_match(name))
        .filter(|name| seen.insert(name.to_string()))
        .map(str::to_string)
        .collect();

    Ok(serde_json::to_value(SubdomainReport::new(target, subdomains))?)
}

fn result_file_name(args: &ValidatedArgs) -> String {
    format!("{}_crtsh.json", args.str("target").unwrap_or("target"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> ValidatedArgs {
        ValidatedArgs::new().with("target", "example.com")
    }

    #[test]
    fn test_target_is_url_encoded_by_curl() {
        let command = build_command(&args());
        assert_eq!(command.program, "curl");
        assert!(command.args.contains(&"q=example.com".to_string()));
        assert_eq!(command.args.last().map(String::as_str), Some(ENDPOINT));
    }

    #[test]
    fn test_parse_unique_in_order() {
        let stdout = r#"[
            {"id": 1, "name_value": "www.example.com\nexample.com"},
            {"id": 2, "name_value": "mail.example.com\nwww.example.com"},
            {"id": 3, "name_value": "*.example.com"},
            {"id": 4, "name_value": "www.other.org"},
            {"id": 5}
        ]"#;
        let value = parse_output(&args(), &RawOutput::from_stdout(stdout)).unwrap();
        assert_eq!(
            value,
            json!({
                "domain": "example.com",
                "subdomains": ["www.example.com", "mail.example.com", "*.example.com"],
                "count": 3,
            })
        );
    }

    #[test]
    fn test_html_error_page_fails() {
        let err = parse_output(&args(), &RawOutput::from_stdout("<html>502 Bad Gateway</html>")).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
        assert_eq!(DEF.parse_fallback, ParseFallback::Fail);
    }
}
