// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod process_runner;
pub mod result_store;
pub mod time_provider;
pub mod tool_adapter;

// Re-exports
pub use id_provider::{IdProvider, UuidProvider};
pub use process_runner::{ProcessError, ProcessOutcome, ProcessRunner, Termination};
pub use result_store::{ResultStore, StoreError};
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use tool_adapter::{ParseError, ToolAdapter};
