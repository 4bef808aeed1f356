// Nmap - port scanning and service detection

use crate::text::{cached, content_lines};
use crate::ScannerDef;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "nmap";

pub const SCAN_OPTIONS: &[&str] = &[
    "no_ping",
    "version",
    "os_detection",
    "aggressive",
    "verbose",
    "top_ports",
    "udp",
    "quick",
];

pub static DEF: ScannerDef = ScannerDef {
    name: "NmapScanner",
    description: "Scan a host or network with nmap and report open ports and detected services.",
    default_timeout: Duration::from_secs(900),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: Some(result_file_name),
};

#[derive(Debug, Serialize, PartialEq)]
pub struct PortFinding {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    pub version: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct HostFindings {
    pub host: String,
    pub ports: Vec<PortFinding>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NmapReport {
    pub hosts: Vec<HostFindings>,
    pub summary: Option<String>,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![
        ArgSpec::required("target", ArgKind::String, "Host name, IP address or CIDR block").with(Constraint::Host),
        ArgSpec::optional("ports", ArgKind::String, "Ports to scan, e.g. 22,80,8000-8100").with(Constraint::PortList),
        ArgSpec::optional("scan_options", ArgKind::StringList, "Scan behaviours to enable")
            .with(Constraint::OneOf(SCAN_OPTIONS)),
    ]
}

fn option_flags(option: &str) -> &'static [&'static str] {
    match option {
        "no_ping" => &["-Pn"],
        "version" => &["-sV"],
        "os_detection" => &["-O"],
        "aggressive" => &["-A"],
        "verbose" => &["-v"],
        "top_ports" => &["--top-ports", "100"],
        "udp" => &["-sU"],
        "quick" => &["-T4"],
        _ => &[],
    }
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let mut command = CommandSpec::new(PROGRAM);
    for option in args.list("scan_options") {
        for flag in option_flags(option) {
            command.push(*flag);
        }
    }
    if let Some(ports) = args.str("ports") {
        command.push_pair("-p", ports);
    }
    command.push(args.str("target").unwrap_or_default());
    command
}

fn host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"^Nmap scan report for (.+)$")
}

fn port_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"^(\d+)/(tcp|udp|sctp)\s+(\S+)\s+(\S+)(?:\s+(.+))?$")
}

fn done_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"^Nmap done: (.+)$")
}

/// Normal (human) output: host blocks, port table rows, closing summary
pub fn parse_output(_args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let mut report = NmapReport {
        hosts: Vec::new(),
        summary: None,
    };

    for line in content_lines(&output.stdout) {
        if let Some(caps) = host_pattern().captures(line) {
            report.hosts.push(HostFindings {
                host: caps[1].to_string(),
                ports: Vec::new(),
            });
        } else if let Some(caps) = port_pattern().captures(line) {
            let Some(host) = report.hosts.last_mut() else {
                continue;
            };
            let Ok(port) = caps[1].parse::<u16>() else {
                continue;
            };
            host.ports.push(PortFinding {
                port,
                protocol: caps[2].to_string(),
                state: caps[3].to_string(),
                service: caps[4].to_string(),
                version: caps.get(5).map(|m| m.as_str().trim().to_string()),
            });
        } else if let Some(caps) = done_pattern().captures(line) {
            report.summary = Some(caps[1].to_string());
        }
    }

    if report.hosts.is_empty() && report.summary.is_none() {
        return Err(ParseError::Unrecognized("no nmap report found".into()));
    }
    Ok(serde_json::to_value(report)?)
}

fn result_file_name(args: &ValidatedArgs) -> String {
    format!("nmap_{}.json", args.str("target").unwrap_or("target"))
}
