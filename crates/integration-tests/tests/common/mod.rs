//! Shared fixtures: small adapters over ubiquitous executables plus wiring helpers

#![allow(dead_code)]

use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use whiterabbit_api_rpc::RpcHandler;
use whiterabbit_core::application::{ConcurrencyLimiter, CoordinatorConfig, InvocationCoordinator, ToolRegistry};
use whiterabbit_core::domain::{ArgKind, ArgSpec, CommandSpec, Constraint, RawOutput, ValidatedArgs};
use whiterabbit_core::port::{ParseError, ProcessRunner, ResultStore, ToolAdapter};
use whiterabbit_infra_system::{FsResultStore, ProcessSupervisor, SupervisorConfig};

/// `sleep <seconds>`; `timeout` overrides the deadline
pub struct SleepTool;

impl ToolAdapter for SleepTool {
    fn name(&self) -> &str {
        "SleepTool"
    }

    fn description(&self) -> &str {
        "Sleep for a number of seconds"
    }

    fn schema(&self) -> Vec<ArgSpec> {
        vec![
            ArgSpec::required("seconds", ArgKind::Integer, "Seconds to sleep")
                .with(Constraint::IntRange { min: 0, max: 30 }),
            ArgSpec::optional("timeout", ArgKind::Integer, "Deadline in seconds")
                .with(Constraint::IntRange { min: 1, max: 60 }),
        ]
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn build_command(&self, args: &ValidatedArgs) -> CommandSpec {
        let command = CommandSpec::new("sleep").arg(args.int("seconds").unwrap_or_default().to_string());
        match args.int("timeout") {
            Some(secs) => command.with_timeout(Duration::from_secs(secs as u64)),
            None => command,
        }
    }

    fn parse_output(&self, args: &ValidatedArgs, _output: &RawOutput) -> Result<Value, ParseError> {
        Ok(json!({ "slept": args.int("seconds") }))
    }
}

/// `printf %s <text>`; persists its output
pub struct PrintTool;

impl ToolAdapter for PrintTool {
    fn name(&self) -> &str {
        "PrintTool"
    }

    fn description(&self) -> &str {
        "Print text verbatim"
    }

    fn schema(&self) -> Vec<ArgSpec> {
        vec![ArgSpec::required("text", ArgKind::String, "Text to print").with(Constraint::SafeText)]
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn build_command(&self, args: &ValidatedArgs) -> CommandSpec {
        CommandSpec::new("printf").arg("%s").arg(args.str("text").unwrap_or_default())
    }

    fn parse_output(&self, _args: &ValidatedArgs, output: &RawOutput) -> Result<Value, ParseError> {
        Ok(json!({ "printed": output.stdout }))
    }

    fn persists_results(&self) -> bool {
        true
    }

    fn result_file_name(&self, _args: &ValidatedArgs) -> Option<String> {
        Some("printed.json".to_string())
    }
}

/// Every scanner plus the fixture tools
pub fn registry() -> Arc<ToolRegistry> {
    let mut registry = whiterabbit_toolkit::default_registry().unwrap();
    registry.register(Arc::new(SleepTool)).unwrap();
    registry.register(Arc::new(PrintTool)).unwrap();
    Arc::new(registry)
}

pub fn supervisor() -> Arc<ProcessSupervisor> {
    Arc::new(ProcessSupervisor::new(SupervisorConfig {
        grace_period: Duration::from_millis(200),
        ..SupervisorConfig::default()
    }))
}

pub fn coordinator_with(
    runner: Arc<dyn ProcessRunner>,
    store: Arc<dyn ResultStore>,
    max_concurrent: Option<usize>,
    output_root: PathBuf,
) -> Arc<InvocationCoordinator> {
    Arc::new(InvocationCoordinator::new(
        registry(),
        runner,
        store,
        ConcurrencyLimiter::new(max_concurrent),
        CoordinatorConfig {
            output_root,
            ..CoordinatorConfig::default()
        },
    ))
}

/// Real supervisor, real filesystem store
pub fn real_coordinator(output_root: PathBuf) -> Arc<InvocationCoordinator> {
    coordinator_with(supervisor(), Arc::new(FsResultStore::new()), None, output_root)
}

pub fn handler(coordinator: Arc<InvocationCoordinator>) -> Arc<RpcHandler> {
    Arc::new(RpcHandler::new(coordinator))
}
