// WhiteRabbit Infrastructure - System Adapters
// Implements: ProcessRunner (ProcessSupervisor), ResultStore (FsResultStore)

pub mod fs_result_store;
pub mod output_capture;
pub mod process_supervisor;

pub use fs_result_store::FsResultStore;
pub use output_capture::{capture, BoundedBuffer, CapturedStream, OutputChunks};
pub use process_supervisor::{is_alive, ProcessSupervisor, SupervisorConfig};
