//! JSON-RPC Server (TCP)
//!
//! Opt-in transport for operators and scripts. Binds to localhost only.
//! Methods: `tools/list`, `tools/call`, `admin.stats.v1`.

use crate::error::{invalid_params, Result, ServerError};
use crate::handler::RpcHandler;
use crate::types::ToolCallParams;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
    shutdown: CancellationToken,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: Arc<RpcHandler>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            handler,
            shutdown,
        }
    }

    /// Build the method table
    pub fn module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("tools/list", move |_, _, _| {
                let handler = handler.clone();
                async move { Ok::<_, ErrorObjectOwned>(handler.list_tools()) }
            })
            .map_err(|e| register_error("tools/list", e))?;

        let handler = self.handler.clone();
        let shutdown = self.shutdown.clone();
        module
            .register_async_method("tools/call", move |params, _, _| {
                let handler = handler.clone();
                // dropped future (client gone) or daemon shutdown cancels the call
                let cancel = shutdown.child_token();
                async move {
                    let _guard = cancel.clone().drop_guard();
                    let req: ToolCallParams = params.parse().map_err(|e| invalid_params(e.message()))?;
                    Ok::<_, ErrorObjectOwned>(handler.call_tool(req, cancel).await)
                }
            })
            .map_err(|e| register_error("tools/call", e))?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { Ok::<_, ErrorObjectOwned>(handler.stats()) }
            })
            .map_err(|e| register_error("admin.stats.v1", e))?;

        Ok(module)
    }

    /// Start the JSON-RPC server
    ///
    /// # Errors
    /// - ServerError::Bind if the address is unavailable
    /// - ServerError::Register if a method name is registered twice
    pub async fn start(self) -> Result<ServerHandle> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "Starting JSON-RPC server on TCP"
        );

        let module = self.module()?;
        let server = Server::builder().build(&addr).await.map_err(|e| ServerError::Bind {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

        info!(addr = %addr, "JSON-RPC server started");
        Ok(server.start(module))
    }
}

fn register_error(method: &'static str, err: impl std::fmt::Display) -> ServerError {
    ServerError::Register {
        method,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::handler_with;
    use crate::types::{StatsResponse, ToolCallResponse, ToolsListResponse};
    use serde_json::json;
    use whiterabbit_core::port::process_runner::mocks::StubProcessRunner;

    fn server(runner: StubProcessRunner) -> RpcServer {
        RpcServer::new(RpcServerConfig::default(), handler_with(runner), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_module_lists_tools() {
        let module = server(StubProcessRunner::new_stdout("")).module().unwrap();
        let list: ToolsListResponse = module
            .call("tools/list", jsonrpsee::core::params::ArrayParams::new())
            .await
            .unwrap();
        assert_eq!(list.tools.len(), 11);
    }

    #[tokio::test]
    async fn test_module_calls_tool_and_reports_stats() {
        let module = server(StubProcessRunner::new_stdout("scanned text")).module().unwrap();

        let mut params = jsonrpsee::core::params::ObjectParams::new();
        params.insert("name", "OcrScanner").unwrap();
        params.insert("arguments", json!({"file_path": "page.png"})).unwrap();
        let response: ToolCallResponse = module.call("tools/call", params).await.unwrap();
        assert!(!response.is_error);
        assert_eq!(response.structured_content.output.unwrap()["text"], "scanned text");

        let stats: StatsResponse = module
            .call("admin.stats.v1", jsonrpsee::core::params::ArrayParams::new())
            .await
            .unwrap();
        assert_eq!(stats.spawn_count, 1);
        assert_eq!(stats.tools, 11);
    }

    #[tokio::test]
    async fn test_module_rejects_bad_params() {
        let module = server(StubProcessRunner::new_stdout("")).module().unwrap();
        let mut params = jsonrpsee::core::params::ObjectParams::new();
        params.insert("arguments", json!({})).unwrap();
        let result = module.call::<_, ToolCallResponse>("tools/call", params).await;
        assert!(result.is_err());
    }
}
