// Process Supervisor
// The only component touching OS process primitives: spawn with a discrete
// argv and allowlisted environment, bounded capture, deadline, cancellation,
// SIGTERM -> grace -> SIGKILL on the whole process group, always reap.
// Commands with setup steps share one deadline and one scratch folder.
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use whiterabbit_core::domain::CommandSpec;
use whiterabbit_core::port::{ProcessError, ProcessOutcome, ProcessRunner, Termination};

use crate::output_capture::{capture, CapturedStream};

#[cfg(unix)]
use nix::sys::signal::Signal;

/// Time between SIGTERM and SIGKILL (5 seconds)
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Per-stream capture cap (4 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// How long stream drains may run after the child exits (2 seconds)
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Environment variables passed through to tools
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "USER", "LANG", "TERM"];

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub env_allowlist: Vec<String>,
    pub max_output_bytes: usize,
    pub grace_period: Duration,
    pub drain_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            env_allowlist: DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            grace_period: DEFAULT_GRACE_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

/// What woke the supervisor while the child was running
enum Wake {
    Exited(std::io::Result<ExitStatus>),
    Deadline,
    Cancelled,
}

/// Process supervisor
/// Spawns isolated child processes with environment allowlisting
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    spawned: AtomicU64,
}

impl ProcessSupervisor {
    /// Create a new process supervisor
    ///
    /// # Example
    /// ```ignore
    /// let supervisor = ProcessSupervisor::new(SupervisorConfig {
    ///     grace_period: Duration::from_secs(2),
    ///     ..SupervisorConfig::default()
    /// });
    /// ```
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            spawned: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Filter environment variables to allowlist only
    fn filter_env<I>(&self, env: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        env.into_iter()
            .filter(|(k, _)| self.config.env_allowlist.contains(k))
            .collect()
    }

    fn spawn(&self, command: &CommandSpec) -> Result<Child, ProcessError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        // Lead a fresh process group so signals reach descendants too
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|e| ProcessError::SpawnFailed {
            program: command.program.clone(),
            reason: e.to_string(),
        })
    }

    /// SIGTERM, wait out the grace period, then SIGKILL. Always reaps.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) {
        #[cfg(unix)]
        {
            if let Some(pid) = pid {
                signal_group(pid, Signal::SIGTERM);
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = child.start_kill() {
                debug!(pid = ?pid, error = %e, "Kill request failed");
            }
        }

        match tokio::time::timeout(self.config.grace_period, child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid = ?pid, status = %status, "Process exited after SIGTERM");
            }
            Ok(Err(e)) => {
                warn!(pid = ?pid, error = %e, "Wait failed after SIGTERM");
            }
            Err(_) => {
                warn!(
                    pid = ?pid,
                    grace_ms = self.config.grace_period.as_millis() as u64,
                    "Process did not exit after SIGTERM, sending SIGKILL"
                );
                #[cfg(unix)]
                {
                    if let Some(pid) = pid {
                        signal_group(pid, Signal::SIGKILL);
                    }
                }
                if let Err(e) = child.start_kill() {
                    debug!(pid = ?pid, error = %e, "Kill request failed");
                }
                if let Err(e) = child.wait().await {
                    warn!(pid = ?pid, error = %e, "Failed to reap process");
                }
            }
        }
    }

    /// Collect both streams. Pipes kept open by a surviving descendant get
    /// a bounded window, then the drains are stopped and the group killed.
    async fn drain(
        &self,
        stdout: Option<JoinHandle<CapturedStream>>,
        stderr: Option<JoinHandle<CapturedStream>>,
        stop: CancellationToken,
        pid: Option<u32>,
    ) -> (CapturedStream, CapturedStream) {
        let window = self.config.drain_timeout;
        let watchdog = {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(window).await;
                warn!(pid = ?pid, "Output still open after exit, abandoning stream drain");
                #[cfg(unix)]
                {
                    if let Some(pid) = pid {
                        signal_group(pid, Signal::SIGKILL);
                    }
                }
                stop.cancel();
            })
        };

        let stdout = join_capture(stdout).await;
        let stderr = join_capture(stderr).await;
        watchdog.abort();
        (stdout, stderr)
    }

    /// One process, no setup steps
    async fn run_one(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError> {
        let started = Instant::now();
        let mut child = self.spawn(command)?;
        self.spawned.fetch_add(1, Ordering::Relaxed);
        let pid = child.id();

        info!(
            pid = ?pid,
            program = %command.program,
            args = ?command.args,
            timeout_ms = timeout.as_millis() as u64,
            "Process spawned"
        );

        let stop = CancellationToken::new();
        let cap = self.config.max_output_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(capture(out, cap, stop.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture(err, cap, stop.clone())));

        let wake = tokio::select! {
            status = child.wait() => Wake::Exited(status),
            _ = tokio::time::sleep(timeout) => Wake::Deadline,
            _ = cancel.cancelled() => Wake::Cancelled,
        };

        let termination = match wake {
            Wake::Exited(Ok(status)) => Termination::Exited(status.code()),
            Wake::Exited(Err(e)) => {
                warn!(pid = ?pid, error = %e, "Wait on child failed, terminating");
                self.terminate(&mut child, pid).await;
                stop.cancel();
                return Err(ProcessError::Io(e.to_string()));
            }
            Wake::Deadline => {
                warn!(pid = ?pid, timeout_ms = timeout.as_millis() as u64, "Deadline reached, terminating process");
                self.terminate(&mut child, pid).await;
                Termination::TimedOut
            }
            Wake::Cancelled => {
                info!(pid = ?pid, "Cancellation requested, terminating process");
                self.terminate(&mut child, pid).await;
                Termination::Cancelled
            }
        };

        let (stdout, stderr) = self.drain(stdout_task, stderr_task, stop, pid).await;
        let duration = started.elapsed();

        info!(
            pid = ?pid,
            termination = ?termination,
            duration_ms = duration.as_millis() as u64,
            stdout_bytes = stdout.total_bytes,
            stderr_bytes = stderr.total_bytes,
            truncated = stdout.truncated || stderr.truncated,
            "Process finished"
        );

        Ok(ProcessOutcome {
            pid,
            termination,
            stdout: stdout.text(),
            stderr: stderr.text(),
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            duration,
        })
    }
}

async fn join_capture(task: Option<JoinHandle<CapturedStream>>) -> CapturedStream {
    match task {
        Some(handle) => handle.await.unwrap_or_else(|e| {
            warn!(error = %e, "Output capture task failed");
            CapturedStream::default()
        }),
        None => CapturedStream::default(),
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => debug!(pid, signal = signal.as_str(), "Signalled process group"),
        // Group already gone
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid, signal = signal.as_str(), error = %e, "Failed to signal process group"),
    }
}

/// Check if a process still exists (zombies count as existing)
pub fn is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // Signal 0 checks if process exists without actually sending a signal
        kill(Pid::from_raw(raw), None::<Signal>).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[async_trait]
impl ProcessRunner for ProcessSupervisor {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome, ProcessError> {
        if command.setup.is_empty() && !command.uses_scratch() {
            return self.run_one(command, timeout, cancel).await;
        }

        // Removed on drop, whatever the outcome
        let scratch = tempfile::Builder::new()
            .prefix("whiterabbit-")
            .tempdir()
            .map_err(|e| ProcessError::Io(format!("scratch folder: {e}")))?;
        let command = command.in_scratch(scratch.path());
        let started = Instant::now();

        for step in &command.setup {
            let remaining = timeout.saturating_sub(started.elapsed());
            let outcome = self.run_one(step, remaining, cancel.clone()).await?;
            if outcome.termination != Termination::Exited(Some(0)) {
                warn!(
                    program = %step.program,
                    termination = ?outcome.termination,
                    "Setup step did not succeed, skipping the rest"
                );
                return Ok(ProcessOutcome {
                    duration: started.elapsed(),
                    ..outcome
                });
            }
        }

        let remaining = timeout.saturating_sub(started.elapsed());
        let outcome = self.run_one(&command, remaining, cancel).await?;
        Ok(ProcessOutcome {
            duration: started.elapsed(),
            ..outcome
        })
    }

    fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}
