// Domain Layer - Pure data model: tools, arguments, invocations

pub mod error;
pub mod invocation;
pub mod net;
pub mod schema;
pub mod tool;

// Re-exports
pub use error::{DomainError, ValidationError};
pub use invocation::{
    ErrorDetail, ErrorKind, InvocationId, InvocationPhase, InvocationRequest, InvocationResult,
    InvocationState, InvocationStatus, OUTPUT_DIR_ARG,
};
pub use net::{parse_ipv4_network, Ipv4Cidr};
pub use schema::{ArgKind, ArgSpec, ArgValue, Constraint, ValidatedArgs};
pub use tool::{sanitize_file_component, CommandSpec, ParseFallback, RawOutput, ScratchArg, SCRATCH_PLACEHOLDER};
