// WhiteRabbit Toolkit - Tool Adapters
// Closed set of wrapped executables. Adding a tool = one module, one
// Scanner variant, one entry in Scanner::ALL.

pub mod amass;
pub mod crtsh;
pub mod dnsrecon;
pub mod holehe;
pub mod nmap;
pub mod ocr;
pub mod sherlock;
pub mod sqlmap;
pub mod sublist3r;
mod text;
pub mod wpscan;
pub mod zmap;

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use whiterabbit_core::application::ToolRegistry;
use whiterabbit_core::domain::{ArgSpec, CommandSpec, ParseFallback, RawOutput, ValidatedArgs, ValidationError};
use whiterabbit_core::port::{ParseError, ToolAdapter};

/// Static definition of one adapter; each tool module exports one
pub struct ScannerDef {
    pub name: &'static str,
    pub description: &'static str,
    pub default_timeout: Duration,
    pub schema: fn() -> Vec<ArgSpec>,
    pub check: fn(&ValidatedArgs) -> Result<(), ValidationError>,
    pub build: fn(&ValidatedArgs) -> CommandSpec,
    pub parse: fn(&ValidatedArgs, &RawOutput) -> Result<Value, ParseError>,
    pub accepts_exit_code: fn(i32) -> bool,
    pub parse_fallback: ParseFallback,
    /// Present only for tools whose results may be persisted
    pub result_file_name: Option<fn(&ValidatedArgs) -> String>,
}

pub(crate) fn no_check(_args: &ValidatedArgs) -> Result<(), ValidationError> {
    Ok(())
}

pub(crate) fn exit_zero(code: i32) -> bool {
    code == 0
}

/// The wrapped tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scanner {
    Zmap,
    Nmap,
    WpScan,
    Holehe,
    Sqlmap,
    Ocr,
    Sublist3r,
    DnsRecon,
    Sherlock,
    Amass,
    Crtsh,
}

impl Scanner {
    pub const ALL: [Scanner; 11] = [
        Scanner::Zmap,
        Scanner::Nmap,
        Scanner::WpScan,
        Scanner::Holehe,
        Scanner::Sqlmap,
        Scanner::Ocr,
        Scanner::Sublist3r,
        Scanner::DnsRecon,
        Scanner::Sherlock,
        Scanner::Amass,
        Scanner::Crtsh,
    ];

    pub fn def(&self) -> &'static ScannerDef {
        match self {
            Scanner::Zmap => &zmap::DEF,
            Scanner::Nmap => &nmap::DEF,
            Scanner::WpScan => &wpscan::DEF,
            Scanner::Holehe => &holehe::DEF,
            Scanner::Sqlmap => &sqlmap::DEF,
            Scanner::Ocr => &ocr::DEF,
            Scanner::Sublist3r => &sublist3r::DEF,
            Scanner::DnsRecon => &dnsrecon::DEF,
            Scanner::Sherlock => &sherlock::DEF,
            Scanner::Amass => &amass::DEF,
            Scanner::Crtsh => &crtsh::DEF,
        }
    }
}

impl ToolAdapter for Scanner {
    fn name(&self) -> &str {
        self.def().name
    }

    fn description(&self) -> &str {
        self.def().description
    }

    fn schema(&self) -> Vec<ArgSpec> {
        (self.def().schema)()
    }

    fn default_timeout(&self) -> Duration {
        self.def().default_timeout
    }

    fn check(&self, args: &ValidatedArgs) -> Result<(), ValidationError> {
        (self.def().check)(args)
    }

    fn build_command(&self, args: &ValidatedArgs) -> CommandSpec {
        (self.def().build)(args)
    }

    fn parse_output(&self, args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
        (self.def().parse)(args, output)
    }

    fn accepts_exit_code(&self, code: i32) -> bool {
        (self.def().accepts_exit_code)(code)
    }

    fn parse_fallback(&self) -> ParseFallback {
        self.def().parse_fallback
    }

    fn persists_results(&self) -> bool {
        self.def().result_file_name.is_some()
    }

    fn result_file_name(&self, args: &ValidatedArgs) -> Option<String> {
        self.def().result_file_name.map(|name| name(args))
    }
}

/// Registry holding every scanner
///
/// # Errors
/// - AppError::Registry if two scanners share a name
pub fn default_registry() -> whiterabbit_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for scanner in Scanner::ALL {
        registry.register(Arc::new(scanner))?;
    }
    tracing::debug!(tools = registry.len(), "Tool registry built");
    Ok(registry)
}
