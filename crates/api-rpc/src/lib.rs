//! Protocol Layer
//!
//! Exposes the tool catalogue to clients over two transports:
//! MCP (line-delimited JSON-RPC 2.0 on stdio) and JSON-RPC over localhost TCP.

pub mod error;
pub mod handler;
pub mod mcp_server;
pub mod server;
pub mod types;

pub use error::ServerError;
pub use handler::RpcHandler;
pub use mcp_server::McpServer;
pub use server::{RpcServer, RpcServerConfig};
