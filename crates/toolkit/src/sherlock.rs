// Sherlock - username search across social networks

use crate::text::{cached, content_lines, strip_ansi};
use crate::ScannerDef;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, ParseFallback, RawOutput, ValidatedArgs};
use whiterabbit_core::port::ParseError;

pub const PROGRAM: &str = "sherlock";

pub static DEF: ScannerDef = ScannerDef {
    name: "SherlockScanner",
    description: "Find accounts matching one or more usernames across social networks with Sherlock.",
    default_timeout: Duration::from_secs(600),
    schema,
    check: crate::no_check,
    build: build_command,
    parse: parse_output,
    accepts_exit_code: crate::exit_zero,
    parse_fallback: ParseFallback::RawText,
    result_file_name: None,
};

#[derive(Debug, Serialize, PartialEq)]
pub struct Account {
    pub site: String,
    pub url: String,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct SherlockReport {
    pub found: BTreeMap<String, Vec<Account>>,
    pub total: usize,
}

pub fn schema() -> Vec<ArgSpec> {
    vec![
        ArgSpec::required("usernames", ArgKind::StringList, "Usernames to search for")
            .with(Constraint::Username)
            .with(Constraint::NonEmpty),
        ArgSpec::optional("timeout", ArgKind::Integer, "Per-request timeout in seconds")
            .with(Constraint::IntRange { min: 1, max: 300 }),
        ArgSpec::optional("sites", ArgKind::StringList, "Limit the search to these sites").with(Constraint::SafeText),
        ArgSpec::optional("nsfw", ArgKind::Boolean, "Include NSFW sites"),
    ]
}

pub fn build_command(args: &ValidatedArgs) -> CommandSpec {
    let mut command = CommandSpec::new(PROGRAM)
        .arg("--print-found")
        .arg("--no-color")
        .arg("--no-txt");
    if let Some(timeout) = args.int("timeout") {
        command.push_pair("--timeout", timeout.to_string());
    }
    for site in args.list("sites") {
        command.push_pair("--site", site.as_str());
    }
    if args.flag("nsfw") {
        command.push("--nsfw");
    }
    for username in args.list("usernames") {
        command.push(username.as_str());
    }
    command
}

fn checking_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"^\[\*\] Checking username (\S+) on:")
}

fn found_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    cached(&PATTERN, r"^\[\+\] ([^:]+): (\S+)$")
}

pub fn parse_output(_args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
    let stdout = strip_ansi(&output.stdout);
    let mut report = SherlockReport::default();
    let mut current: Option<String> = None;

    for line in content_lines(&stdout) {
        if let Some(caps) = checking_pattern().captures(line) {
            let username = caps[1].to_string();
            report.found.entry(username.clone()).or_default();
            current = Some(username);
        } else if let Some(caps) = found_pattern().captures(line) {
            let Some(username) = &current else {
                continue;
            };
            report.found.entry(username.clone()).or_default().push(Account {
                site: caps[1].trim().to_string(),
                url: caps[2].to_string(),
            });
            report.total += 1;
        }
    }

    if current.is_none() {
        return Err(ParseError::Unrecognized("no Sherlock search header".into()));
    }
    Ok(serde_json::to_value(report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "\
[*] Checking username alice on:

[+] GitHub: https://www.github.com/alice
[+] Reddit: https://www.reddit.com/user/alice

[*] Search completed with 2 results
[*] Checking username bob_99 on:

[*] Search completed with 0 results
";

    #[test]
    fn test_command_order() {
        let args = ValidatedArgs::new()
            .with("usernames", vec!["alice".to_string(), "bob_99".to_string()])
            .with("timeout", 30_i64)
            .with("sites", vec!["GitHub".to_string()])
            .with("nsfw", true);
        assert_eq!(
            build_command(&args).args,
            vec![
                "--print-found",
                "--no-color",
                "--no-txt",
                "--timeout",
                "30",
                "--site",
                "GitHub",
                "--nsfw",
                "alice",
                "bob_99",
            ]
        );
    }

    #[test]
    fn test_parse_accounts_per_user() {
        let value = parse_output(&ValidatedArgs::new(), &RawOutput::from_stdout(SAMPLE)).unwrap();
        assert_eq!(
            value,
            json!({
                "found": {
                    "alice": [
                        {"site": "GitHub", "url": "https://www.github.com/alice"},
                        {"site": "Reddit", "url": "https://www.reddit.com/user/alice"},
                    ],
                    "bob_99": [],
                },
                "total": 2,
            })
        );
    }

    #[test]
    fn test_missing_header_is_unrecognized() {
        let err = parse_output(&ValidatedArgs::new(), &RawOutput::from_stdout("error: bad args")).unwrap_err();
        assert!(matches!(err, ParseError::Unrecognized(_)));
    }
}
