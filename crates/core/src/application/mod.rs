// Application Layer - Use Cases: registry, validation, coordination

pub mod constants;
pub mod coordinator;
pub mod limiter;
pub mod registry;
pub mod tracker;
pub mod validator;

// Re-exports
pub use coordinator::{CoordinatorConfig, InvocationCoordinator};
pub use limiter::{ConcurrencyLimiter, ExecutionPermit};
pub use registry::{RegistryError, ToolDescriptor, ToolRegistry};
pub use tracker::{InvocationTracker, TrackedInvocation, TrackerStats};
