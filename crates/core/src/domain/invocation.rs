// Invocation Domain Model - request, lifecycle state machine and result

use super::error::{DomainError, Result};
use super::schema::ValidatedArgs;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type InvocationId = String;

/// Argument key that carries the output destination inside a tool call
pub const OUTPUT_DIR_ARG: &str = "output_dir";

/// A client's request to run one tool
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub tool: String,
    pub arguments: Value,
    pub output_dir: Option<String>,
}

impl InvocationRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            output_dir: None,
        }
    }

    /// Build from protocol call arguments, lifting a string `output_dir`
    /// out of the argument map. A non-string `output_dir` is left in place
    /// for the validator to reject.
    pub fn from_call(tool: impl Into<String>, arguments: Value) -> Self {
        let mut arguments = arguments;
        let mut output_dir = None;
        if let Value::Object(map) = &mut arguments {
            if let Some(Value::String(_)) = map.get(OUTPUT_DIR_ARG) {
                if let Some(Value::String(dir)) = map.remove(OUTPUT_DIR_ARG) {
                    output_dir = Some(dir);
                }
            }
        }
        Self {
            tool: tool.into(),
            arguments,
            output_dir,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// Invocation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationPhase {
    Received,
    Validating,
    Validated,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
    InvalidInput,
}

impl InvocationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvocationPhase::Succeeded
                | InvocationPhase::Failed
                | InvocationPhase::TimedOut
                | InvocationPhase::Cancelled
                | InvocationPhase::InvalidInput
        )
    }

    /// Allowed edges of the state machine
    pub fn can_transition_to(&self, next: InvocationPhase) -> bool {
        use InvocationPhase::*;
        match (self, next) {
            (Received, Validating | InvalidInput | Cancelled) => true,
            (Validating, Validated | InvalidInput | Cancelled) => true,
            (Validated, Running | Cancelled) => true,
            (Running, Succeeded | Failed | TimedOut | Cancelled) => true,
            // Isolated panics may fail an invocation from any live phase
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for InvocationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvocationPhase::Received => write!(f, "RECEIVED"),
            InvocationPhase::Validating => write!(f, "VALIDATING"),
            InvocationPhase::Validated => write!(f, "VALIDATED"),
            InvocationPhase::Running => write!(f, "RUNNING"),
            InvocationPhase::Succeeded => write!(f, "SUCCEEDED"),
            InvocationPhase::Failed => write!(f, "FAILED"),
            InvocationPhase::TimedOut => write!(f, "TIMED_OUT"),
            InvocationPhase::Cancelled => write!(f, "CANCELLED"),
            InvocationPhase::InvalidInput => write!(f, "INVALID_INPUT"),
        }
    }
}

/// Terminal status reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
    InvalidInput,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Succeeded => "succeeded",
            InvocationStatus::Failed => "failed",
            InvocationStatus::TimedOut => "timed_out",
            InvocationStatus::Cancelled => "cancelled",
            InvocationStatus::InvalidInput => "invalid_input",
        }
    }
}

impl From<InvocationStatus> for InvocationPhase {
    fn from(status: InvocationStatus) -> Self {
        match status {
            InvocationStatus::Succeeded => InvocationPhase::Succeeded,
            InvocationStatus::Failed => InvocationPhase::Failed,
            InvocationStatus::TimedOut => InvocationPhase::TimedOut,
            InvocationStatus::Cancelled => InvocationPhase::Cancelled,
            InvocationStatus::InvalidInput => InvocationPhase::InvalidInput,
        }
    }
}

/// Error classification carried in results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownTool,
    MissingArgument,
    TypeMismatch,
    ConstraintViolation,
    UnexpectedArgument,
    ProcessSpawn,
    ProcessExit,
    Timeout,
    Cancellation,
    ParseFailed,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

/// Final, immutable outcome of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub id: InvocationId,
    pub tool: String,
    pub status: InvocationStatus,
    pub output: Option<Value>,
    pub parse_degraded: bool,
    pub error: Option<ErrorDetail>,
    pub exit_code: Option<i32>,
    pub truncated: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub saved_to: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

impl InvocationResult {
    pub fn new(id: impl Into<InvocationId>, tool: impl Into<String>, status: InvocationStatus) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            status,
            output: None,
            parse_degraded: false,
            error: None,
            exit_code: None,
            truncated: false,
            duration_ms: 0,
            saved_to: None,
            warnings: Vec::new(),
        }
    }

    /// Non-succeeded result with an error detail
    pub fn failure(
        id: impl Into<InvocationId>,
        tool: impl Into<String>,
        status: InvocationStatus,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(id, tool, status);
        result.error = Some(ErrorDetail {
            kind,
            message: message.into(),
        });
        result
    }

    pub fn is_success(&self) -> bool {
        self.status == InvocationStatus::Succeeded
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Per-invocation mutable state, owned by the coordinator task
#[derive(Debug, Clone)]
pub struct InvocationState {
    pub id: InvocationId,
    pub tool: String,
    pub args: Option<ValidatedArgs>,
    pub pid: Option<u32>,
    pub started_at: i64,
    pub deadline: Option<i64>,
    pub phase: InvocationPhase,
}

impl InvocationState {
    pub fn new(id: impl Into<InvocationId>, tool: impl Into<String>, now_millis: i64) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            args: None,
            pid: None,
            started_at: now_millis,
            deadline: None,
            phase: InvocationPhase::Received,
        }
    }

    /// Move to `next`, rejecting edges the state machine does not allow.
    /// Once terminal, every further transition is rejected.
    pub fn transition(&mut self, next: InvocationPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = InvocationState::new("inv-1", "NmapScanner", 0);
        state.transition(InvocationPhase::Validating).unwrap();
        state.transition(InvocationPhase::Validated).unwrap();
        state.transition(InvocationPhase::Running).unwrap();
        state.transition(InvocationPhase::Succeeded).unwrap();
        assert!(state.phase.is_terminal());
    }

    #[test]
    fn test_first_terminal_transition_wins() {
        let mut state = InvocationState::new("inv-1", "NmapScanner", 0);
        state.transition(InvocationPhase::Validating).unwrap();
        state.transition(InvocationPhase::Validated).unwrap();
        state.transition(InvocationPhase::Running).unwrap();
        state.transition(InvocationPhase::TimedOut).unwrap();

        let err = state.transition(InvocationPhase::Cancelled).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(state.phase, InvocationPhase::TimedOut);
    }

    #[test]
    fn test_cannot_skip_validation() {
        let mut state = InvocationState::new("inv-1", "NmapScanner", 0);
        assert!(state.transition(InvocationPhase::Running).is_err());
        assert!(state.transition(InvocationPhase::Succeeded).is_err());
    }

    #[test]
    fn test_unknown_tool_goes_straight_to_invalid_input() {
        let mut state = InvocationState::new("inv-1", "Nope", 0);
        state.transition(InvocationPhase::InvalidInput).unwrap();
    }

    #[test]
    fn test_from_call_lifts_output_dir() {
        let request = InvocationRequest::from_call(
            "Sublist3rScanner",
            json!({"domain": "example.com", "output_dir": "runs/a"}),
        );
        assert_eq!(request.output_dir.as_deref(), Some("runs/a"));
        assert_eq!(request.arguments, json!({"domain": "example.com"}));

        let untouched = InvocationRequest::from_call("Sublist3rScanner", json!({"output_dir": 7}));
        assert_eq!(untouched.output_dir, None);
        assert_eq!(untouched.arguments, json!({"output_dir": 7}));
    }

    #[test]
    fn test_result_serializes_snake_case() {
        let result = InvocationResult::failure(
            "inv-1",
            "ZmapScanner",
            InvocationStatus::InvalidInput,
            ErrorKind::ConstraintViolation,
            "bad subnet",
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "invalid_input");
        assert_eq!(value["error"]["kind"], "constraint_violation");
        assert!(value.get("saved_to").is_none());
    }
}
