// Amass - subdomain enumeration (enum) and organisation intelligence (intel)

use crate::text::{content_lines, strip_ansi};
use crate::ScannerDef;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use whiterabbit_core::domain::{
    ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs, ValidationError,
};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "amass";

pub static DEF: ScannerDef = ScannerDef {
    name: "AmassScanner",
    description: "Map a domain's attack surface with OWASP Amass: subdomain enumeration (enum) or intelligence gathering (intel).",
    default_timeout: Duration::from_secs(1800),
    schema,
    check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: Some(result_file_name),
};

#[derive(Debug, Serialize, PartialEq)]
pub struct AmassReport {
    pub subcommand: String,
    pub results: Vec<String>,
    pub count: usize,
    pub domain: Option<String>,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![
        ArgSpec::required("subcommand", ArgKind::String, "Operation mode")
            .with(Constraint::OneOf(&["enum", "intel"])),
        ArgSpec::optional("domain", ArgKind::String, "Target domain").with(Constraint::Domain),
        ArgSpec::optional("intel_whois", ArgKind::Boolean, "intel: include reverse WHOIS"),
        ArgSpec::optional("intel_organization", ArgKind::String, "intel: organisation name to search for")
            .with(Constraint::SafeText),
        ArgSpec::optional("enum_type", ArgKind::String, "enum: active or passive discovery")
            .with(Constraint::OneOf(&["active", "passive"])),
        ArgSpec::optional("enum_brute", ArgKind::Boolean, "enum: brute force subdomains"),
        ArgSpec::optional("enum_brute_wordlist", ArgKind::String, "enum: wordlist for brute forcing")
            .with(Constraint::FilePath),
    ]
}

fn check(args: &ValidatedArgs) -> Result<(), ValidationError> {
    match args.str("subcommand") {
        Some("enum") if !args.contains("domain") => Err(ValidationError::constraint(
            "domain",
            "required_for(enum)",
            "enum needs a domain",
        )),
        Some("intel") if !args.contains("domain") && !args.contains("intel_organization") => {
            Err(ValidationError::constraint(
                "domain",
                "required_for(intel)",
                "intel needs a domain or an organization",
            ))
        }
        _ => Ok(()),
    }
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let subcommand = args.str("subcommand").unwrap_or("enum");
    let mut command = CommandSpec::new(PROGRAM).arg(subcommand);
    if let Some(domain) = args.str("domain") {
        command.push_pair("-d", domain);
    }

    if subcommand == "enum" {
        if args.str("enum_type") == Some("passive") {
            command.push("-passive");
        }
        if args.flag("enum_brute") {
            command.push("-brute");
            if let Some(wordlist) = args.str("enum_brute_wordlist") {
                command.push_pair("-w", wordlist);
            }
        }
    } else {
        if let Some(org) = args.str("intel_organization") {
            command.push_pair("-org", org);
        }
        if args.flag("intel_whois") {
            command.push("-whois");
        }
    }
    command
}

/// One finding per line; anything non-empty counts
pub fn parse_output(args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let stdout = strip_ansi(&output.stdout);
    let results: Vec<String> = content_lines(&stdout).map(str::to_string).collect();
    let report = AmassReport {
        subcommand: args.str("subcommand").unwrap_or("enum").to_string(),
        count: results.len(),
        results,
        domain: args.str("domain").map(str::to_string),
    };
    Ok(serde_json::to_value(report)?)
}

fn result_file_name(args: &ValidatedArgs) -> String {
    let subject = args
        .str("domain")
        .or_else(|| args.str("intel_organization"))
        .unwrap_or("amass");
    format!("{subject}_amass.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enum_command() {
        let args = ValidatedArgs::new()
            .with("subcommand", "enum")
            .with("domain", "example.com")
            .with("enum_type", "passive")
            .with("enum_brute", true)
            .with("enum_brute_wordlist", "lists/words.txt");
        assert_eq!(
            build_command(&args).args,
            vec!["enum", "-d", "example.com", "-passive", "-brute", "-w", "lists/words.txt"]
        );
    }

    #[test]
    fn test_wordlist_ignored_without_brute() {
        let args = ValidatedArgs::new()
            .with("subcommand", "enum")
            .with("domain", "example.com")
            .with("enum_brute_wordlist", "lists/words.txt");
        assert_eq!(build_command(&args).args, vec!["enum", "-d", "example.com"]);
    }

    #[test]
    fn test_intel_command() {
        let args = ValidatedArgs::new()
            .with("subcommand", "intel")
            .with("intel_organization", "Example Corp")
            .with("intel_whois", true);
        assert_eq!(build_command(&args).args, vec!["intel", "-org", "Example Corp", "-whois"]);
    }

    #[test]
    fn test_cross_field_rules() {
        let enum_without_domain = ValidatedArgs::new().with("subcommand", "enum");
        assert!(check(&enum_without_domain).is_err());

        let intel_with_org = ValidatedArgs::new()
            .with("subcommand", "intel")
            .with("intel_organization", "Example Corp");
        assert!(check(&intel_with_org).is_ok());

        let bare_intel = ValidatedArgs::new().with("subcommand", "intel");
        assert!(check(&bare_intel).is_err());
    }

    #[test]
    fn test_parse_lines() {
        let args = ValidatedArgs::new().with("subcommand", "enum").with("domain", "example.com");
        let value = parse_output(&args, &RawOutput::from_stdout("www.example.com\n\nmail.example.com\n")).unwrap();
        assert_eq!(
            value,
            json!({
                "subcommand": "enum",
                "results": ["www.example.com", "mail.example.com"],
                "count": 2,
                "domain": "example.com",
            })
        );
    }

    #[test]
    fn test_file_name_prefers_domain() {
        let args = ValidatedArgs::new()
            .with("subcommand", "intel")
            .with("intel_organization", "Example Corp");
        assert_eq!(result_file_name(&args), "Example Corp_amass.json");
    }
}
