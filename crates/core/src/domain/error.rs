// Domain Error Types

use super::invocation::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid invocation state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;

/// Rejection of a request's arguments. Never reaches the process layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{argument}' must be {expected}, got {found}")]
    TypeMismatch {
        argument: String,
        expected: String,
        found: String,
    },

    #[error("argument '{argument}' violates {rule}: {reason}")]
    ConstraintViolation {
        argument: String,
        rule: String,
        reason: String,
    },

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

impl ValidationError {
    pub fn constraint(
        argument: impl Into<String>,
        rule: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ValidationError::ConstraintViolation {
            argument: argument.into(),
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::MissingArgument(_) => ErrorKind::MissingArgument,
            ValidationError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ValidationError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            ValidationError::UnexpectedArgument(_) => ErrorKind::UnexpectedArgument,
        }
    }
}
