// Tool Adapter Port
// One implementation per wrapped executable: schema, command line, output parser

use crate::domain::{ArgSpec, CommandSpec, ParseFallback, RawOutput, ValidatedArgs, ValidationError};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Output the adapter could not turn into structured findings
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Unrecognized output: {0}")]
    Unrecognized(String),

    #[error("Malformed JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool Adapter trait
///
/// Adapters are pure and stateless. Their only side effect is the process
/// the supervisor runs on their behalf, and the program they name is a
/// constant of the adapter, never taken from argument values.
pub trait ToolAdapter: Send + Sync {
    /// Protocol name, unique in the registry
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Ordered argument declarations
    fn schema(&self) -> Vec<ArgSpec>;

    fn default_timeout(&self) -> Duration;

    /// Cross-field rules run after per-argument validation
    fn check(&self, _args: &ValidatedArgs) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Translate validated arguments into a discrete argument vector
    fn build_command(&self, args: &ValidatedArgs) -> CommandSpec;

    /// Turn captured output into structured findings
    fn parse_output(&self, args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError>;

    /// Exit codes treated as success
    fn accepts_exit_code(&self, code: i32) -> bool {
        code == 0
    }

    /// Policy when `parse_output` fails on an accepted exit
    fn parse_fallback(&self) -> ParseFallback {
        ParseFallback::RawText
    }

    /// Whether results may be written to a caller-chosen folder
    fn persists_results(&self) -> bool {
        false
    }

    /// File name for persisted results (only consulted when persisting)
    fn result_file_name(&self, _args: &ValidatedArgs) -> Option<String> {
        None
    }
}
