//! Protocol Error Types
//!
//! JSON-RPC error codes and transport-level failures. Invocation failures
//! never use these: they travel inside a well-formed result.

use jsonrpsee::types::ErrorObjectOwned;
use thiserror::Error;

/// JSON-RPC 2.0 error codes
pub mod code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Transport failures (bind, register, broken stdio)
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Failed to register method {method}: {reason}")]
    Register { method: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// -32602 for the TCP transport
pub fn invalid_params(message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code::INVALID_PARAMS as i32, message.into(), None::<()>)
}
