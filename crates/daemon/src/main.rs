//! WhiteRabbit MCP - Main Entry Point
//! Composition root: configuration, logging, wiring, transport, signals.

mod config;

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use whiterabbit_api_rpc::{McpServer, RpcHandler, RpcServer};
use whiterabbit_core::application::InvocationCoordinator;
use whiterabbit_core::VERSION;
use whiterabbit_infra_system::{FsResultStore, ProcessSupervisor};

use crate::config::{DaemonConfig, Transport};

const DEFAULT_LOG_FILTER: &str = "whiterabbit=info";
const LOG_FORMAT_VAR: &str = "WHITERABBIT_LOG_FORMAT";
const LOG_DIR_VAR: &str = "WHITERABBIT_LOG_DIR";
const LOG_FILE_PREFIX: &str = "whiterabbit-mcp.log";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging (stderr only: stdout carries the protocol)
    let _log_guard = init_logging()?;
    info!("WhiteRabbit MCP v{} starting...", VERSION);

    // 2. Configuration
    let config = DaemonConfig::load()?;
    info!(
        transport = ?config.transport,
        max_concurrent = config.max_concurrent,
        output_root = %config.output_root,
        "Configuration loaded"
    );

    // 3. Wiring
    let registry = Arc::new(whiterabbit_toolkit::default_registry().context("Tool registry build failed")?);
    info!(tools = registry.len(), "Tool registry ready");

    let supervisor = Arc::new(ProcessSupervisor::new(config.supervisor()));
    let store = Arc::new(FsResultStore::new());
    let coordinator = Arc::new(InvocationCoordinator::new(
        registry,
        supervisor,
        store,
        config.limiter(),
        config.coordinator(),
    ));
    let handler = Arc::new(RpcHandler::new(coordinator));

    // 4. Shutdown on SIGINT / SIGTERM
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    // 5. Serve until the client leaves or a signal arrives
    match config.transport {
        Transport::Stdio => {
            info!("Serving MCP on stdio");
            McpServer::new(handler, shutdown.clone())
                .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
                .await
                .context("MCP server failed")?;
        }
        Transport::Tcp => {
            let rpc_handle = RpcServer::new(config.rpc(), handler, shutdown.clone())
                .start()
                .await
                .context("RPC server start failed")?;
            info!("Press Ctrl+C to shutdown");

            shutdown.cancelled().await;
            rpc_handle
                .stop()
                .map_err(|e| anyhow!("RPC server stop failed: {}", e))?;
            rpc_handle.stopped().await;
        }
    }

    shutdown.cancel();
    info!("Shutdown complete.");
    Ok(())
}

/// JSON or pretty on stderr, plus an optional daily-rotated JSON file
fn init_logging() -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to create env filter")?;

    let json = std::env::var(LOG_FORMAT_VAR).map(|f| f == "json").unwrap_or(false);
    let stderr_layer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().pretty().with_writer(std::io::stderr).boxed()
    };

    let (file_layer, guard) = match std::env::var(LOG_DIR_VAR) {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer.and_then(file_layer).with_filter(env_filter))
        .init();
    Ok(guard)
}

async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                    _ = term.recv() => info!("SIGTERM received"),
                    _ = shutdown.cancelled() => return,
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable; watching Ctrl+C only");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Ctrl+C received"),
            _ = shutdown.cancelled() => return,
        }
    }
    info!("Shutdown signal received. Cancelling in-flight invocations...");
    shutdown.cancel();
}
