// DNSRecon - DNS record enumeration

use crate::text::{content_lines, strip_ansi};
use crate::ScannerDef;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use whiterabbit_core::domain::{
    ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs, ValidationError,
};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "dnsrecon";

pub const SCAN_TYPES: &[&str] = &[
    "std", "rvl", "brt", "srv", "axfr", "bing", "yand", "crt", "snoop", "tld", "zonewalk",
];

const RECORD_TYPES: &[&str] = &[
    "A", "AAAA", "CAA", "CNAME", "DNSKEY", "DS", "HINFO", "MX", "NAPTR", "NS", "NSEC", "NSEC3", "PTR", "RRSIG", "SOA",
    "SPF", "SRV", "TXT",
];

pub static DEF: ScannerDef = ScannerDef {
    name: "DNSReconScanner",
    description: "Enumerate DNS records of a domain (standard, brute force, zone transfer, reverse lookup and more).",
    default_timeout: Duration::from_secs(600),
    schema,
    check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: Some(result_file_name),
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DnsRecord {
    pub record_type: String,
    pub name: String,
    pub data: String,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![
        ArgSpec::required("domain", ArgKind::String, "Target domain").with(Constraint::Domain),
        ArgSpec::optional("scan_type", ArgKind::String, "Enumeration type")
            .with(Constraint::OneOf(SCAN_TYPES))
            .with_default("std"),
        ArgSpec::optional("name_server", ArgKind::String, "Name server to query").with(Constraint::Host),
        ArgSpec::optional("range", ArgKind::String, "IPv4 range or CIDR for reverse lookups (rvl)")
            .with(Constraint::Ipv4Network),
        ArgSpec::optional("dictionary", ArgKind::String, "Wordlist for brute force (brt)").with(Constraint::FilePath),
    ]
}

fn check(args: &ValidatedArgs) -> Result<(), ValidationError> {
    if args.str("scan_type") == Some("rvl") && !args.contains("range") {
        return Err(ValidationError::constraint(
            "range",
            "required_for(rvl)",
            "reverse lookup needs an IP range",
        ));
    }
    Ok(())
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let scan_type = args.str("scan_type").unwrap_or("std");
    let mut command = CommandSpec::new(PROGRAM);
    command.push_pair("-t", scan_type);
    match (scan_type, args.str("range")) {
        ("rvl", Some(range)) => command.push_pair("-r", range),
        _ => command.push_pair("-d", args.str("domain").unwrap_or_default()),
    }
    if let Some(ns) = args.str("name_server") {
        command.push_pair("-n", ns);
    }
    if let Some(dictionary) = args.str("dictionary") {
        command.push_pair("-D", dictionary);
    }
    command
}

/// Parse one record line such as `A example.com 93.184.216.34`
fn parse_record(line: &str) -> Option<DnsRecord> {
    let mut tokens = line.split_whitespace();
    let record_type = tokens.next().filter(|t| RECORD_TYPES.contains(t))?;
    let name = tokens.next()?;
    let data: Vec<&str> = tokens.collect();
    if data.is_empty() {
        return None;
    }
    Some(DnsRecord {
        record_type: record_type.to_string(),
        name: name.to_string(),
        data: data.join(" "),
    })
}

/// Records are printed with `[*]` / `[+]` markers or bare; `[-]` lines are
/// notices and never records.
pub fn parse_output(_args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let stdout = strip_ansi(&output.stdout);
    let mut records = Vec::new();
    let mut saw_markers = false;

    for line in content_lines(&stdout) {
        let body = if let Some(rest) = line.strip_prefix("[*]").or_else(|| line.strip_prefix("[+]")) {
            saw_markers = true;
            rest
        } else if line.starts_with('[') {
            saw_markers = true;
            continue;
        } else {
            line
        };
        if let Some(record) = parse_record(body) {
            records.push(record);
        }
    }

    if records.is_empty() && !saw_markers {
        return Err(ParseError::Unrecognized("no DNS records or dnsrecon status lines".into()));
    }
    Ok(serde_json::to_value(records)?)
}

fn result_file_name(args: &ValidatedArgs) -> String {
    format!("{}_dnsrecon.json", args.str("domain").unwrap_or("domain"))
}
