// sqlmap - SQL injection testing (non-interactive, runs to completion)

use crate::text::{cached, content_lines};
use crate::ScannerDef;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "sqlmap";

pub static DEF: ScannerDef = ScannerDef {
    name: "SqlmapScanner",
    description: "Test a URL for SQL injection with sqlmap in batch mode and report injectable parameters.",
    default_timeout: Duration::from_secs(1800),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: None,
};

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct Technique {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: Option<String>,
    pub payload: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct InjectionPoint {
    pub parameter: String,
    pub place: String,
    pub techniques: Vec<Technique>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct SqlmapReport {
    pub vulnerable: bool,
    pub injection_points: Vec<InjectionPoint>,
    pub dbms: Option<String>,
    pub critical: Vec<String>,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![
        ArgSpec::required("url", ArgKind::String, "Target URL including the query string").with(Constraint::HttpUrl),
        ArgSpec::optional("data", ArgKind::String, "POST body to test, e.g. id=1&name=x").with(Constraint::SafeText),
        ArgSpec::optional("level", ArgKind::Integer, "Test level").with(Constraint::IntRange { min: 1, max: 5 }),
        ArgSpec::optional("risk", ArgKind::Integer, "Test risk").with(Constraint::IntRange { min: 1, max: 3 }),
    ]
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let mut command = CommandSpec::new(PROGRAM);
    command.push_pair("-u", args.str("url").unwrap_or_default());
    command.push("--batch");
    command.push("--disable-coloring");
    if let Some(data) = args.str("data") {
        command.push(format!("--data={data}"));
    }
    if let Some(level) = args.int("level") {
        command.push(format!("--level={level}"));
    }
    if let Some(risk) = args.int("risk") {
        command.push(format!("--risk={risk}"));
    }
    command
}

fn parameter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"^Parameter: (.+?) \((.+)\)$")
}

fn vulnerable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"(\w+) parameter '(.+?)' (is vulnerable.*)")
}

fn log_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"^\[\d{2}:\d{2}:\d{2}\] \[[A-Z]+\]")
}

fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key)?.strip_prefix(':').map(str::trim)
}

pub fn parse_output(_args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let mut report = SqlmapReport::default();
    let mut recognized = false;

    for line in content_lines(&output.stdout) {
        if log_pattern().is_match(line) {
            recognized = true;
        }

        if line.contains("[CRITICAL]") {
            report.critical.push(line.to_string());
        } else if let Some(caps) = parameter_pattern().captures(line) {
            // the summary block supersedes an earlier "is vulnerable" notice
            let parameter = caps[1].to_string();
            report.injection_points.retain(|p| p.parameter != parameter);
            report.injection_points.push(InjectionPoint {
                parameter,
                place: caps[2].to_string(),
                techniques: Vec::new(),
            });
        } else if let Some(kind) = field(line, "Type") {
            if let Some(point) = report.injection_points.last_mut() {
                point.techniques.push(Technique {
                    kind: kind.to_string(),
                    ..Technique::default()
                });
            }
        } else if let Some(title) = field(line, "Title") {
            if let Some(technique) = report.injection_points.last_mut().and_then(|p| p.techniques.last_mut()) {
                technique.title = Some(title.to_string());
            }
        } else if let Some(payload) = field(line, "Payload") {
            if let Some(technique) = report.injection_points.last_mut().and_then(|p| p.techniques.last_mut()) {
                technique.payload = Some(payload.to_string());
            }
        } else if let Some(dbms) = field(line, "back-end DBMS") {
            report.dbms = Some(dbms.to_string());
        } else if let Some(caps) = vulnerable_pattern().captures(line) {
            let parameter = caps[2].to_string();
            if !report.injection_points.iter().any(|p| p.parameter == parameter) {
                report.injection_points.push(InjectionPoint {
                    parameter,
                    place: caps[1].to_string(),
                    techniques: Vec::new(),
                });
            }
        }
    }

    report.vulnerable = !report.injection_points.is_empty();
    if !recognized && !report.vulnerable && report.dbms.is_none() {
        return Err(ParseError::Unrecognized("no sqlmap log lines".into()));
    }
    Ok(serde_json::to_value(report)?)
}
