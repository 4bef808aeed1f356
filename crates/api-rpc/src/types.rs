//! Protocol Request/Response Types
//!
//! MCP payloads (`tools/list`, `tools/call`), the admin stats payload, and
//! the JSON-RPC 2.0 envelope used by the stdio transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use whiterabbit_core::application::ToolDescriptor;
use whiterabbit_core::domain::InvocationResult;

pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// JSON-RPC 2.0 envelope (stdio transport)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// Absent for notifications
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
            id,
        }
    }
}

// ============================================================================
// tools/list
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for ToolInfo {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            name: descriptor.name().to_string(),
            description: descriptor.description().to_string(),
            input_schema: descriptor.input_schema(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResponse {
    pub tools: Vec<ToolInfo>,
}

// ============================================================================
// tools/call
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// MCP tool result: the invocation result as text and as structured content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResponse {
    pub content: Vec<ContentBlock>,
    pub structured_content: InvocationResult,
    pub is_error: bool,
}

impl From<InvocationResult> for ToolCallResponse {
    fn from(result: InvocationResult) -> Self {
        let text = serde_json::to_string(&result).unwrap_or_else(|_| "{}".to_string());
        Self {
            content: vec![ContentBlock {
                kind: "text".to_string(),
                text,
            }],
            is_error: !result.is_success(),
            structured_content: result,
        }
    }
}

// ============================================================================
// admin.stats.v1
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub tools: usize,
    pub max_concurrent: Option<usize>,
    /// Processes currently holding a permit
    pub running: usize,
    /// Invocations queued for a permit
    pub waiting: usize,
    pub in_flight: usize,
    pub by_phase: BTreeMap<String, usize>,
    pub completed: BTreeMap<String, u64>,
    pub spawn_count: u64,
}
