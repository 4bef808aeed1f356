// Invocation Coordinator
// validate -> build command -> supervise -> parse -> result, one task per invocation.
// Every path ends in exactly one InvocationResult; no invocation error escapes.

use super::constants::{DEFAULT_MAX_TIMEOUT, DEFAULT_OUTPUT_ROOT, ERROR_EXCERPT_BYTES};
use super::limiter::ConcurrencyLimiter;
use super::registry::{ToolDescriptor, ToolRegistry};
use super::tracker::{InvocationTracker, TrackedInvocation};
use super::validator;
use crate::domain::{
    sanitize_file_component, CommandSpec, ErrorDetail, ErrorKind, InvocationId, InvocationPhase,
    InvocationRequest, InvocationResult, InvocationState, InvocationStatus, ParseFallback,
    RawOutput, ValidatedArgs,
};
use crate::port::{
    IdProvider, ProcessError, ProcessOutcome, ProcessRunner, ResultStore, SystemTimeProvider, Termination,
    TimeProvider, UuidProvider,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Startup-time settings; never changed per request
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Global override of every adapter's default timeout
    pub default_timeout: Option<Duration>,
    /// Hard cap applied after all other timeout sources
    pub max_timeout: Duration,
    /// Persisted results land under this folder
    pub output_root: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            max_timeout: DEFAULT_MAX_TIMEOUT,
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
        }
    }
}

pub struct InvocationCoordinator {
    registry: Arc<ToolRegistry>,
    runner: Arc<dyn ProcessRunner>,
    store: Arc<dyn ResultStore>,
    limiter: ConcurrencyLimiter,
    tracker: Arc<InvocationTracker>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    config: CoordinatorConfig,
}

impl InvocationCoordinator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        runner: Arc<dyn ProcessRunner>,
        store: Arc<dyn ResultStore>,
        limiter: ConcurrencyLimiter,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            runner,
            store,
            limiter,
            tracker: Arc::new(InvocationTracker::new()),
            id_provider: Arc::new(UuidProvider),
            time_provider: Arc::new(SystemTimeProvider),
            config,
        }
    }

    pub fn with_id_provider(mut self, id_provider: Arc<dyn IdProvider>) -> Self {
        self.id_provider = id_provider;
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<InvocationTracker> {
        &self.tracker
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn spawn_count(&self) -> u64 {
        self.runner.spawn_count()
    }

    /// Run one invocation on the current task
    pub async fn invoke(&self, request: InvocationRequest, cancel: CancellationToken) -> InvocationResult {
        let id = self.id_provider.generate_id();
        self.invoke_with_id(id, request, cancel).await
    }

    /// Run one invocation on its own task. A panic anywhere inside it
    /// becomes a Failed result of kind `internal`.
    pub async fn invoke_isolated(
        self: &Arc<Self>,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> InvocationResult {
        let id = self.id_provider.generate_id();
        let tool = request.tool.clone();
        let started = Instant::now();

        let coordinator = Arc::clone(self);
        let task_id = id.clone();
        let handle =
            tokio::spawn(async move { coordinator.invoke_with_id(task_id, request, cancel).await });

        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                let reason = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "invocation task was aborted".to_string()
                };
                error!(invocation_id = %id, tool = %tool, reason = %reason, "Invocation task panicked");
                self.tracker.record(InvocationStatus::Failed);

                let mut result = InvocationResult::failure(
                    id,
                    tool,
                    InvocationStatus::Failed,
                    ErrorKind::Internal,
                    format!("internal error: {reason}"),
                );
                result.duration_ms = elapsed_ms(started);
                result
            }
        }
    }

    async fn invoke_with_id(
        &self,
        id: InvocationId,
        request: InvocationRequest,
        cancel: CancellationToken,
    ) -> InvocationResult {
        let started = Instant::now();
        let tracked = self.tracker.track(InvocationState::new(
            id,
            request.tool.clone(),
            self.time_provider.now_millis(),
        ));
        debug!(invocation_id = %tracked.id(), tool = %request.tool, "Invocation received");

        let mut result = self.drive(&tracked, request, &cancel).await;
        result.duration_ms = elapsed_ms(started);

        if tracked.finish(result.status) {
            log_result(&result);
        }
        result
    }

    async fn drive(
        &self,
        tracked: &TrackedInvocation,
        request: InvocationRequest,
        cancel: &CancellationToken,
    ) -> InvocationResult {
        let id = tracked.id().to_string();
        let reject = |kind: ErrorKind, message: String| {
            InvocationResult::failure(id.clone(), request.tool.clone(), InvocationStatus::InvalidInput, kind, message)
        };

        // Received -> Validating
        let descriptor = match self.registry.lookup(&request.tool) {
            Ok(descriptor) => descriptor,
            Err(e) => return reject(ErrorKind::UnknownTool, e.to_string()),
        };
        advance(tracked, InvocationPhase::Validating);

        // Validating -> Validated
        let args = match validator::validate(&descriptor, &request.arguments) {
            Ok(args) => args,
            Err(e) => return reject(e.kind(), e.to_string()),
        };
        let output_dir = match request
            .output_dir
            .as_deref()
            .map(|dir| validator::validate_output_dir(&descriptor, dir))
            .transpose()
        {
            Ok(dir) => dir,
            Err(e) => return reject(e.kind(), e.to_string()),
        };
        if let Err(e) = tracked.validated(args.clone()) {
            warn!(invocation_id = %id, error = %e, "Unexpected state transition");
        }

        let adapter = descriptor.adapter();
        let command = adapter.build_command(&args);
        let timeout = self.effective_timeout(&descriptor, &command);

        // Queue for a slot; a cancellation here never spawns
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(invocation_id = %id, tool = %descriptor.name(), "Invocation cancelled while queued");
                return InvocationResult::failure(
                    id.clone(),
                    descriptor.name(),
                    InvocationStatus::Cancelled,
                    ErrorKind::Cancellation,
                    "invocation cancelled before the process started",
                );
            }
            permit = self.limiter.acquire() => permit,
        };

        // Validated -> Running
        let deadline = self.time_provider.now_millis() + duration_ms(timeout) as i64;
        if let Err(e) = tracked.running(deadline) {
            warn!(invocation_id = %id, error = %e, "Unexpected state transition");
        }
        info!(
            invocation_id = %id,
            tool = %descriptor.name(),
            command = %command.display(),
            timeout_ms = duration_ms(timeout),
            "Running tool"
        );

        let outcome = self.runner.run(&command, timeout, cancel.clone()).await;
        drop(permit);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let kind = match &e {
                    ProcessError::SpawnFailed { .. } => ErrorKind::ProcessSpawn,
                    ProcessError::Io(_) => ErrorKind::Internal,
                };
                return InvocationResult::failure(
                    id.clone(),
                    descriptor.name(),
                    InvocationStatus::Failed,
                    kind,
                    e.to_string(),
                );
            }
        };
        tracked.set_pid(outcome.pid);

        let mut result = interpret(&id, &descriptor, &args, &command, &outcome, timeout);

        if let (true, Some(dir), Some(output)) = (result.is_success(), output_dir, result.output.clone()) {
            self.persist(&descriptor, &args, &dir, &output, &mut result).await;
        }
        result
    }

    /// Adapter override, else global default, else adapter default; capped
    fn effective_timeout(&self, descriptor: &ToolDescriptor, command: &CommandSpec) -> Duration {
        command
            .timeout_override
            .or(self.config.default_timeout)
            .unwrap_or_else(|| descriptor.default_timeout())
            .min(self.config.max_timeout)
    }

    /// Write-through; failure only adds a warning
    async fn persist(
        &self,
        descriptor: &ToolDescriptor,
        args: &ValidatedArgs,
        dir: &Path,
        output: &Value,
        result: &mut InvocationResult,
    ) {
        let file_name = descriptor
            .adapter()
            .result_file_name(args)
            .map(|name| sanitize_file_component(&name))
            .unwrap_or_else(|| format!("{}_{}.json", sanitize_file_component(descriptor.name()), result.id));
        let target = self.config.output_root.join(dir);

        match self.store.save(&target, &file_name, output).await {
            Ok(path) => {
                info!(invocation_id = %result.id, path = %path.display(), "Result saved");
                result.saved_to = Some(path.display().to_string());
            }
            Err(e) => {
                warn!(invocation_id = %result.id, error = %e, "Result returned but not saved");
                result.warnings.push(format!("result not saved: {e}"));
            }
        }
    }
}

/// Map a finished process onto a result
fn interpret(
    id: &str,
    descriptor: &ToolDescriptor,
    args: &ValidatedArgs,
    command: &CommandSpec,
    outcome: &ProcessOutcome,
    timeout: Duration,
) -> InvocationResult {
    let adapter = descriptor.adapter();
    let mut result = InvocationResult::new(id, descriptor.name(), InvocationStatus::Succeeded);
    result.exit_code = outcome.exit_code();
    result.truncated = outcome.truncated();
    if result.truncated {
        result
            .warnings
            .push("output exceeded the capture limit and was truncated".to_string());
    }
    let partial = || (!outcome.stdout.is_empty()).then(|| Value::String(outcome.stdout.clone()));

    match outcome.termination {
        Termination::TimedOut => {
            result.status = InvocationStatus::TimedOut;
            result.output = partial();
            result.error = detail(
                ErrorKind::Timeout,
                format!("{} timed out after {:.1}s", command.program, timeout.as_secs_f64()),
            );
        }
        Termination::Cancelled => {
            result.status = InvocationStatus::Cancelled;
            result.output = partial();
            result.error = detail(ErrorKind::Cancellation, format!("{} was cancelled", command.program));
        }
        Termination::Exited(Some(code)) if adapter.accepts_exit_code(code) => {
            let raw = RawOutput {
                exit_code: Some(code),
                stdout: outcome.stdout.clone(),
                stderr: outcome.stderr.clone(),
                truncated: outcome.truncated(),
            };
            match adapter.parse_output(args, &raw) {
                Ok(parsed) => result.output = Some(parsed),
                Err(e) => match adapter.parse_fallback() {
                    ParseFallback::RawText => {
                        warn!(invocation_id = %id, tool = %descriptor.name(), error = %e, "Parse degraded to raw text");
                        result.parse_degraded = true;
                        result.output = Some(Value::String(raw.stdout));
                        result.warnings.push(format!("parse degraded: {e}"));
                    }
                    ParseFallback::Fail => {
                        result.status = InvocationStatus::Failed;
                        result.output = partial();
                        result.error = detail(ErrorKind::ParseFailed, e.to_string());
                    }
                },
            }
        }
        Termination::Exited(code) => {
            result.status = InvocationStatus::Failed;
            result.output = partial();
            let headline = match code {
                Some(code) => format!("{} exited with code {code}", command.program),
                None => format!("{} was terminated by a signal", command.program),
            };
            let captured = if outcome.stderr.trim().is_empty() {
                &outcome.stdout
            } else {
                &outcome.stderr
            };
            let message = match excerpt(captured, ERROR_EXCERPT_BYTES) {
                text if text.is_empty() => headline,
                text => format!("{headline}: {text}"),
            };
            result.error = detail(ErrorKind::ProcessExit, message);
        }
    }
    result
}

fn advance(tracked: &TrackedInvocation, next: InvocationPhase) {
    if let Err(e) = tracked.transition(next) {
        warn!(invocation_id = %tracked.id(), error = %e, "Unexpected state transition");
    }
}

fn detail(kind: ErrorKind, message: String) -> Option<ErrorDetail> {
    Some(ErrorDetail { kind, message })
}

fn log_result(result: &InvocationResult) {
    let message = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default();
    match result.status {
        InvocationStatus::Succeeded => info!(
            invocation_id = %result.id,
            tool = %result.tool,
            duration_ms = result.duration_ms,
            parse_degraded = result.parse_degraded,
            truncated = result.truncated,
            "Invocation succeeded"
        ),
        InvocationStatus::InvalidInput => warn!(
            invocation_id = %result.id,
            tool = %result.tool,
            error = %message,
            "Invocation rejected"
        ),
        status => warn!(
            invocation_id = %result.id,
            tool = %result.tool,
            status = status.as_str(),
            exit_code = ?result.exit_code,
            duration_ms = result.duration_ms,
            error = %message,
            "Invocation did not succeed"
        ),
    }
}

/// Trailing `max` bytes of `text`, cut on a char boundary
fn excerpt(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}
