// Orchestration constants (no magic values)
use std::time::Duration;

/// Upper bound on any invocation's timeout (1 hour)
pub const DEFAULT_MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Maximum stderr carried in a ProcessExit error message (4 KiB)
pub const ERROR_EXCERPT_BYTES: usize = 4 * 1024;

/// Default folder results are written under
pub const DEFAULT_OUTPUT_ROOT: &str = "output";
