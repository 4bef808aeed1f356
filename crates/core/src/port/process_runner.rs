// Process Runner Port
// Abstraction over supervised external process execution

use crate::domain::CommandSpec;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// How the supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own. None when killed by a signal.
    Exited(Option<i32>),
    /// Deadline reached, process terminated by the supervisor
    TimedOut,
    /// Cancelled externally, process terminated by the supervisor
    Cancelled,
}

/// Result of one supervised execution
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub pid: Option<u32>,
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration: Duration,
}

impl ProcessOutcome {
    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => code,
            _ => None,
        }
    }

    pub fn truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }
}

/// Process errors (the process never ran or could not be observed)
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Spawn failed for '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("IO error: {0}")]
    Io(String),
}

/// Process Runner trait
///
/// Implementations:
/// - ProcessSupervisor (infra-system): real child processes
/// - StubProcessRunner (mocks): canned outcomes for tests
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion, deadline or cancellation.
    ///
    /// Timeout and cancellation are outcomes, not errors: the process is
    /// terminated and reaped and the partial output returned.
    ///
    /// # Errors
    /// - ProcessError::SpawnFailed if the executable cannot be started
    /// - ProcessError::Io if the child cannot be waited on
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError>;

    /// Number of processes spawned so far
    fn spawn_count(&self) -> u64;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Stub runner behavior
    #[derive(Debug, Clone)]
    pub enum StubBehavior {
        /// Exit with the given code and output after `delay`
        Exit {
            code: i32,
            stdout: String,
            stderr: String,
            delay: Duration,
        },
        /// Never exit on its own (ends only on deadline or cancellation)
        Hang,
        /// Fail to spawn
        SpawnFail(String),
        /// Spawn, then lose track of the child
        IoFail(String),
        /// Panic inside the runner (for isolation tests)
        Panic(String),
    }

    /// Stub Process Runner for testing
    ///
    /// Records every command it is asked to run.
    #[derive(Clone)]
    pub struct StubProcessRunner {
        behavior: Arc<Mutex<StubBehavior>>,
        commands: Arc<Mutex<Vec<CommandSpec>>>,
        spawned: Arc<Mutex<u64>>,
    }

    impl StubProcessRunner {
        pub fn new(behavior: StubBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                commands: Arc::new(Mutex::new(Vec::new())),
                spawned: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_stdout(stdout: impl Into<String>) -> Self {
            Self::new(StubBehavior::Exit {
                code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
                delay: Duration::ZERO,
            })
        }

        pub fn new_exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
            Self::new(StubBehavior::Exit {
                code,
                stdout: stdout.into(),
                stderr: stderr.into(),
                delay: Duration::ZERO,
            })
        }

        pub fn new_delayed(delay: Duration, stdout: impl Into<String>) -> Self {
            Self::new(StubBehavior::Exit {
                code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
                delay,
            })
        }

        pub fn new_hang() -> Self {
            Self::new(StubBehavior::Hang)
        }

        pub fn new_spawn_fail(reason: impl Into<String>) -> Self {
            Self::new(StubBehavior::SpawnFail(reason.into()))
        }

        pub fn new_io_fail(reason: impl Into<String>) -> Self {
            Self::new(StubBehavior::IoFail(reason.into()))
        }

        pub fn new_panic(message: impl Into<String>) -> Self {
            Self::new(StubBehavior::Panic(message.into()))
        }

        /// Commands received so far, in call order
        pub fn commands(&self) -> Vec<CommandSpec> {
            self.commands.lock().unwrap().clone()
        }

        pub fn last_command(&self) -> Option<CommandSpec> {
            self.commands.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl ProcessRunner for StubProcessRunner {
        async fn run(
            &self,
            command: &CommandSpec,
            timeout: Duration,
            cancel: CancellationToken,
        ) -> Result<ProcessOutcome, ProcessError> {
            self.commands.lock().unwrap().push(command.clone());
            let behavior = self.behavior.lock().unwrap().clone();

            let (code, stdout, stderr, delay) = match behavior {
                StubBehavior::SpawnFail(reason) => {
                    return Err(ProcessError::SpawnFailed {
                        program: command.program.clone(),
                        reason,
                    })
                }
                StubBehavior::IoFail(reason) => {
                    *self.spawned.lock().unwrap() += 1;
                    return Err(ProcessError::Io(reason));
                }
                StubBehavior::Panic(msg) => panic!("{}", msg),
                StubBehavior::Hang => (0, String::new(), String::new(), None),
                StubBehavior::Exit {
                    code,
                    stdout,
                    stderr,
                    delay,
                } => (code, stdout, stderr, Some(delay)),
            };
            *self.spawned.lock().unwrap() += 1;

            let started = tokio::time::Instant::now();
            let termination = tokio::select! {
                _ = cancel.cancelled() => Termination::Cancelled,
                _ = tokio::time::sleep(timeout) => Termination::TimedOut,
                _ = async {
                    match delay {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => std::future::pending::<()>().await,
                    }
                } => Termination::Exited(Some(code)),
            };

            let finished = matches!(termination, Termination::Exited(_));
            Ok(ProcessOutcome {
                pid: Some(4242),
                termination,
                stdout: if finished { stdout } else { String::new() },
                stderr: if finished { stderr } else { String::new() },
                stdout_truncated: false,
                stderr_truncated: false,
                duration: started.elapsed(),
            })
        }

        fn spawn_count(&self) -> u64 {
            *self.spawned.lock().unwrap()
        }
    }
}
