//! Protocol Method Handlers
//!
//! Transport-agnostic implementations shared by the stdio and TCP servers.

use crate::types::{StatsResponse, ToolCallParams, ToolCallResponse, ToolInfo, ToolsListResponse};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use whiterabbit_core::application::InvocationCoordinator;
use whiterabbit_core::domain::InvocationRequest;

/// RPC Handler with injected coordinator
pub struct RpcHandler {
    coordinator: Arc<InvocationCoordinator>,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(coordinator: Arc<InvocationCoordinator>) -> Self {
        Self {
            coordinator,
            start_time: Instant::now(),
        }
    }

    pub fn coordinator(&self) -> &Arc<InvocationCoordinator> {
        &self.coordinator
    }

    /// tools/list
    pub fn list_tools(&self) -> ToolsListResponse {
        let tools = self
            .coordinator
            .registry()
            .list()
            .iter()
            .map(|descriptor| ToolInfo::from(descriptor.as_ref()))
            .collect();
        ToolsListResponse { tools }
    }

    /// tools/call
    ///
    /// Always answers with a result; invocation failures are reported
    /// through `isError` and the structured result, never as an RPC error.
    pub async fn call_tool(&self, params: ToolCallParams, cancel: CancellationToken) -> ToolCallResponse {
        debug!(tool = %params.name, "tools/call received");
        let request = InvocationRequest::from_call(params.name, params.arguments);
        let result = self.coordinator.invoke_isolated(request, cancel).await;
        info!(
            invocation_id = %result.id,
            tool = %result.tool,
            status = result.status.as_str(),
            duration_ms = result.duration_ms,
            "tools/call answered"
        );
        ToolCallResponse::from(result)
    }

    /// admin.stats.v1
    pub fn stats(&self) -> StatsResponse {
        let limiter = self.coordinator.limiter();
        let tracker = self.coordinator.tracker().stats();
        StatsResponse {
            version: whiterabbit_core::VERSION.to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            tools: self.coordinator.registry().len(),
            max_concurrent: limiter.limit(),
            running: limiter.running(),
            waiting: limiter.waiting(),
            in_flight: tracker.in_flight,
            by_phase: tracker.by_phase,
            completed: tracker.completed,
            spawn_count: self.coordinator.spawn_count(),
        }
    }
}
