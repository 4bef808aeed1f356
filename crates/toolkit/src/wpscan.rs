// WPScan - WordPress vulnerability scanning

use crate::ScannerDef;
use serde_json::Value;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "wpscan";

/// `--enumerate` option letters
pub const ENUMERATE_OPTIONS: &[&str] = &["vp", "ap", "p", "vt", "at", "t", "tt", "cb", "dbe", "u", "m"];

/// Exit status WPScan uses when the scan found vulnerabilities
pub const EXIT_VULNERABLE: i32 = 5;

pub static DEF: ScannerDef = ScannerDef {
    name: "WPScanScanner",
    description: "Scan a WordPress site for vulnerable core, plugins, themes and users; returns the WPScan JSON report.",
    default_timeout: Duration::from_secs(1200),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code,
    parse_fallback: ParseFallback::RawText,
    result_file_name: None,
};

pub fn schema() -> Vec<ArgSpec> {
    vec![
        ArgSpec::required("url", ArgKind::String, "WordPress site URL").with(Constraint::HttpUrl),
        ArgSpec::optional("api_token", ArgKind::String, "WPScan vulnerability database API token")
            .with(Constraint::SafeText),
        ArgSpec::optional("enumerate", ArgKind::StringList, "Enumeration options")
            .with(Constraint::OneOf(ENUMERATE_OPTIONS)),
        ArgSpec::optional("max_threads", ArgKind::Integer, "Maximum scanner threads")
            .with(Constraint::IntRange { min: 1, max: 50 }),
    ]
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let mut command = CommandSpec::new(PROGRAM);
    command.push_pair("--url", args.str("url").unwrap_or_default());
    command.push("--random-user-agent");
    command.push("--ignore-main-redirect");
    command.push("--no-banner");
    command.push_pair("--format", "json");
    if let Some(threads) = args.int("max_threads") {
        command.push_pair("--max-threads", threads.to_string());
    }
    if let Some(token) = args.str("api_token") {
        command.push_pair("--api-token", token);
    }
    let enumerate = args.list("enumerate");
    if !enumerate.is_empty() {
        command.push_pair("--enumerate", enumerate.join(","));
    }
    command
}

fn accepts_exit_code(code: i32) -> bool {
    code == 0 || code == EXIT_VULNERABLE
}

pub fn parse_output(_args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let report: Value = serde_json::from_str(output.stdout.trim())?;
    if !report.is_object() {
        return Err(ParseError::Unrecognized("WPScan report is not a JSON object".into()));
    }
    Ok(report)
}
