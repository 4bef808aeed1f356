// ZMap - single-port host discovery over an IPv4 network

use crate::text::content_lines;
use crate::ScannerDef;
use serde::Serialize;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::time::Duration;
use whiterabbit_core::domain::{
    parse_ipv4_network, ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs,
};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "zmap";

pub static DEF: ScannerDef = ScannerDef {
    name: "ZmapScanner",
    description: "Scan an IPv4 network (CIDR, address or a.b.c.d-e.f.g.h range) for hosts with one open port.",
    default_timeout: Duration::from_secs(600),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: Some(result_file_name),
};

#[derive(Debug, Serialize, PartialEq)]
pub struct ZmapReport {
    pub port: i64,
    pub hosts: Vec<String>,
    pub total_hosts: usize,
    pub subnets_scanned: Vec<String>,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![
        ArgSpec::required("subnet", ArgKind::String, "Target network: CIDR, single IPv4 or IPv4 range")
            .with(Constraint::Ipv4Network),
        ArgSpec::required("port", ArgKind::Integer, "TCP port to scan").with(Constraint::Port),
        ArgSpec::optional("bandwidth", ArgKind::String, "Send rate cap, e.g. 10M")
            .with(Constraint::Bandwidth)
            .with_default("1M"),
        ArgSpec::optional("interface", ArgKind::String, "Network interface to send from")
            .with(Constraint::InterfaceName),
        ArgSpec::optional("gateway_mac", ArgKind::String, "Gateway MAC address")
            .with(Constraint::MacAddress),
    ]
}

/// Canonical CIDR for the subnet argument. Falls back to the raw value,
/// which validation already ruled out.
fn target_cidr(args: &ValidatedArgs) -> String {
    let subnet = args.str("subnet").unwrap_or_default();
    parse_ipv4_network(subnet).map_or_else(|| subnet.to_string(), |cidr| cidr.to_string())
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let mut command = CommandSpec::new(PROGRAM);
    command.push_pair("-p", args.int("port").unwrap_or_default().to_string());
    command.push_pair("-B", args.str("bandwidth").unwrap_or("1M"));
    if let Some(interface) = args.str("interface") {
        command.push_pair("-i", interface);
    }
    if let Some(mac) = args.str("gateway_mac") {
        command.push_pair("-G", mac);
    }
    command.push("--blacklist-file=/dev/null");
    command.push_pair("-o", "-");
    command.push(target_cidr(args));
    command
}

/// One responding address per stdout line
pub fn parse_output(args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let mut hosts = Vec::new();
    for line in content_lines(&output.stdout) {
        let addr: Ipv4Addr = line
            .parse()
            .map_err(|_| ParseError::Unrecognized(format!("not an IPv4 address: {line}")))?;
        hosts.push(addr.to_string());
    }

    let report = ZmapReport {
        port: args.int("port").unwrap_or_default(),
        total_hosts: hosts.len(),
        hosts,
        subnets_scanned: vec![target_cidr(args)],
    };
    Ok(serde_json::to_value(report)?)
}

fn result_file_name(args: &ValidatedArgs) -> String {
    format!("zmap_{}_{}.json", target_cidr(args), args.int("port").unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> ValidatedArgs {
        ValidatedArgs::new()
            .with("subnet", "10.0.0.1-10.0.0.50")
            .with("port", 443_i64)
            .with("bandwidth", "1M")
    }

    #[test]
    fn test_range_becomes_covering_cidr() {
        let command = build_command(&args());
        assert_eq!(command.program, "zmap");
        assert_eq!(
            command.args,
            vec!["-p", "443", "-B", "1M", "--blacklist-file=/dev/null", "-o", "-", "10.0.0.0/26"]
        );
    }

    #[test]
    fn test_optional_interface_and_gateway() {
        let args = args().with("interface", "eth0").with("gateway_mac", "aa:bb:cc:dd:ee:ff");
        let command = build_command(&args);
        let line = command.display();
        assert!(line.contains("-i eth0"));
        assert!(line.contains("-G aa:bb:cc:dd:ee:ff"));
    }

    #[test]
    fn test_parse_hosts() {
        let value = parse_output(&args(), &RawOutput::from_stdout("10.0.0.4\n10.0.0.9\n\n")).unwrap();
        assert_eq!(
            value,
            json!({
                "port": 443,
                "hosts": ["10.0.0.4", "10.0.0.9"],
                "total_hosts": 2,
                "subnets_scanned": ["10.0.0.0/26"],
            })
        );
    }

    #[test]
    fn test_empty_scan_is_valid() {
        let value = parse_output(&args(), &RawOutput::from_stdout("")).unwrap();
        assert_eq!(value["total_hosts"], 0);
    }

    #[test]
    fn test_non_address_line_is_unrecognized() {
        let err = parse_output(&args(), &RawOutput::from_stdout("Jan 01 zmap: started\n")).unwrap_err();
        assert!(matches!(err, ParseError::Unrecognized(_)));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(result_file_name(&args()), "zmap_10.0.0.0/26_443.json");
    }
}
