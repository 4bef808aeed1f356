//! MCP (Model Context Protocol) stdio server.
//!
//! Each line on the input is one JSON-RPC 2.0 message; each response is
//! written as a single line on the output. Tool calls run concurrently on
//! their own tasks and answer in completion order, correlated by id.
//!
//! Methods:
//! - `initialize`, `ping`
//! - `tools/list`, `tools/call`
//! - `notifications/initialized` (ignored), `notifications/cancelled`
//!
//! End of input, a failed read or the shutdown token cancels every in-flight
//! call and waits for their results to be written before returning. A line
//! that is not UTF-8 is answered with a parse error like any other bad line.

use crate::error::{code, Result};
use crate::handler::RpcHandler;
use crate::types::{JsonRpcRequest, JsonRpcResponse, ToolCallParams};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "whiterabbit-mcp";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A finished tool call, handed back to the I/O loop
struct Completed {
    key: String,
    response: JsonRpcResponse,
}

pub struct McpServer {
    handler: Arc<RpcHandler>,
    shutdown: CancellationToken,
}

impl McpServer {
    pub fn new(handler: Arc<RpcHandler>, shutdown: CancellationToken) -> Self {
        Self { handler, shutdown }
    }

    /// Serve until end of input, an unreadable input or shutdown.
    ///
    /// # Errors
    /// - ServerError::Io if the output cannot be written
    pub async fn run(self, mut input: impl AsyncBufRead + Unpin, mut output: impl AsyncWrite + Unpin) -> Result<()> {
        // Partial reads survive a losing select branch and are resumed
        let mut pending: Vec<u8> = Vec::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completed>();
        let calls = self.shutdown.child_token();
        let _cancel_on_exit = calls.clone().drop_guard();
        let mut in_flight: HashMap<String, CancellationToken> = HashMap::new();

        info!("MCP server reading from stdio");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested; closing MCP session");
                    break;
                }
                Some(done) = done_rx.recv() => {
                    in_flight.remove(&done.key);
                    write_response(&mut output, &done.response).await?;
                }
                read = input.read_until(b'\n', &mut pending) => {
                    let end_of_input = match read {
                        Ok(0) => true,
                        Ok(_) => false,
                        Err(e) => {
                            warn!(error = %e, "Input read failed; closing MCP session");
                            break;
                        }
                    };
                    let raw = std::mem::take(&mut pending);
                    if let Some(response) = self.handle_line(&raw, &calls, &mut in_flight, &done_tx) {
                        write_response(&mut output, &response).await?;
                    }
                    if end_of_input {
                        info!("End of input; closing MCP session");
                        break;
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(pending = in_flight.len(), "Cancelling in-flight tool calls");
        }
        calls.cancel();
        drop(done_tx);
        while let Some(done) = done_rx.recv().await {
            write_response(&mut output, &done.response).await?;
        }
        Ok(())
    }

    /// One raw input line. Bytes that are not UTF-8 get a parse error.
    fn handle_line(
        &self,
        raw: &[u8],
        calls: &CancellationToken,
        in_flight: &mut HashMap<String, CancellationToken>,
        done: &mpsc::UnboundedSender<Completed>,
    ) -> Option<JsonRpcResponse> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                debug!(error = %e, "Input line is not UTF-8");
                return Some(JsonRpcResponse::error(Value::Null, code::PARSE_ERROR, "Parse error"));
            }
        };
        if line.is_empty() {
            return None;
        }
        self.dispatch(line, calls, in_flight, done)
    }

    fn dispatch(
        &self,
        line: &str,
        calls: &CancellationToken,
        in_flight: &mut HashMap<String, CancellationToken>,
        done: &mpsc::UnboundedSender<Completed>,
    ) -> Option<JsonRpcResponse> {
        let message: Value = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Unparseable input line");
                return Some(JsonRpcResponse::error(Value::Null, code::PARSE_ERROR, "Parse error"));
            }
        };
        let request: JsonRpcRequest = match serde_json::from_value(message.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = message.get("id").cloned().unwrap_or(Value::Null);
                return Some(JsonRpcResponse::error(id, code::INVALID_REQUEST, format!("Invalid request: {e}")));
            }
        };

        let Some(id) = request.id else {
            self.notification(&request.method, request.params.as_ref(), in_flight);
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, initialize_result(request.params.as_ref())),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => match serde_json::to_value(self.handler.list_tools()) {
                Ok(list) => JsonRpcResponse::success(id, list),
                Err(e) => JsonRpcResponse::error(id, code::INTERNAL_ERROR, e.to_string()),
            },
            "tools/call" => return self.start_call(id, request.params, calls, in_flight, done),
            other => JsonRpcResponse::error(id, code::METHOD_NOT_FOUND, format!("Method not found: {other}")),
        };
        Some(response)
    }

    fn notification(&self, method: &str, params: Option<&Value>, in_flight: &HashMap<String, CancellationToken>) {
        match method {
            "notifications/cancelled" => {
                let Some(request_id) = params.and_then(|p| p.get("requestId")) else {
                    warn!("notifications/cancelled without requestId");
                    return;
                };
                match in_flight.get(&request_key(request_id)) {
                    Some(token) => {
                        info!(request_id = %request_id, "Client cancelled tool call");
                        token.cancel();
                    }
                    None => debug!(request_id = %request_id, "Cancel for unknown or finished request"),
                }
            }
            other => debug!(method = %other, "Notification ignored"),
        }
    }

    fn start_call(
        &self,
        id: Value,
        params: Option<Value>,
        calls: &CancellationToken,
        in_flight: &mut HashMap<String, CancellationToken>,
        done: &mpsc::UnboundedSender<Completed>,
    ) -> Option<JsonRpcResponse> {
        let params: ToolCallParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => {
                return Some(JsonRpcResponse::error(id, code::INVALID_PARAMS, "Missing params for tools/call"));
            }
            Err(e) => {
                return Some(JsonRpcResponse::error(id, code::INVALID_PARAMS, format!("Invalid params: {e}")));
            }
        };

        let key = request_key(&id);
        if in_flight.contains_key(&key) {
            return Some(JsonRpcResponse::error(
                id,
                code::INVALID_REQUEST,
                "Request id is already in flight",
            ));
        }

        let cancel = calls.child_token();
        in_flight.insert(key.clone(), cancel.clone());

        let handler = Arc::clone(&self.handler);
        let done = done.clone();
        tokio::spawn(async move {
            let result = handler.call_tool(params, cancel).await;
            let response = match serde_json::to_value(result) {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => JsonRpcResponse::error(id, code::INTERNAL_ERROR, e.to_string()),
            };
            // receiver gone means the session already ended
            let _ = done.send(Completed { key, response });
        });
        None
    }
}

/// Map key for a request id; ids compare by their JSON text
fn request_key(id: &Value) -> String {
    id.to_string()
}

fn initialize_result(params: Option<&Value>) -> Value {
    let protocol_version = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": { "listChanged": false } },
        "serverInfo": { "name": SERVER_NAME, "version": whiterabbit_core::VERSION },
    })
}

async fn write_response(writer: &mut (impl AsyncWrite + Unpin), response: &JsonRpcResponse) -> Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::handler_with;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, BufReader, ReadBuf};
    use whiterabbit_core::port::process_runner::mocks::StubProcessRunner;

    async fn run_lines(handler: Arc<RpcHandler>, input: &[&str]) -> Vec<JsonRpcResponse> {
        let mut joined = input.join("\n");
        joined.push('\n');
        let stdin = BufReader::new(std::io::Cursor::new(joined.into_bytes()));
        let mut stdout: Vec<u8> = Vec::new();

        McpServer::new(handler, CancellationToken::new())
            .run(stdin, &mut stdout)
            .await
            .unwrap();

        parse_responses(stdout)
    }

    fn call(id: i64, name: &str, arguments: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments },
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let handler = handler_with(StubProcessRunner::new_stdout(""));
        let responses = run_lines(
            handler,
            &[
                r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
                r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            ],
        )
        .await;

        assert_eq!(responses.len(), 2);
        let init = responses[0].result.as_ref().unwrap();
        assert_eq!(init["protocolVersion"], "2025-03-26");
        assert_eq!(init["serverInfo"]["name"], SERVER_NAME);
        assert!(init["capabilities"].get("tools").is_some());
        assert_eq!(responses[1].id, json!(2));
        assert_eq!(responses[1].result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_tools_list() {
        let handler = handler_with(StubProcessRunner::new_stdout(""));
        let responses = run_lines(handler, &[r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#]).await;

        let tools = responses[0].result.as_ref().unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 11);
        let zmap = tools.iter().find(|t| t["name"] == "ZmapScanner").unwrap();
        assert_eq!(zmap["inputSchema"]["required"], json!(["subnet", "port"]));
        assert_eq!(zmap["inputSchema"]["properties"]["bandwidth"]["default"], "1M");
    }

    #[tokio::test]
    async fn test_tools_call_success_and_invalid_input() {
        let handler = handler_with(StubProcessRunner::new_stdout("www.example.com\n"));
        let responses = run_lines(
            handler,
            &[
                &call(1, "AmassScanner", json!({"subcommand": "enum", "domain": "example.com"})),
                &call(2, "ZmapScanner", json!({"subnet": "not-a-cidr", "port": 80, "bandwidth": "1M"})),
            ],
        )
        .await;

        assert_eq!(responses.len(), 2);
        let by_id = |id: i64| responses.iter().find(|r| r.id == json!(id)).unwrap().result.clone().unwrap();

        let ok = by_id(1);
        assert_eq!(ok["isError"], false);
        assert_eq!(ok["structuredContent"]["status"], "succeeded");
        assert_eq!(ok["structuredContent"]["output"]["results"], json!(["www.example.com"]));

        let invalid = by_id(2);
        assert_eq!(invalid["isError"], true);
        assert_eq!(invalid["structuredContent"]["status"], "invalid_input");
        assert_eq!(invalid["structuredContent"]["error"]["kind"], "constraint_violation");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let handler = handler_with(StubProcessRunner::new_stdout(""));
        let responses = run_lines(
            handler,
            &[
                "this is not json",
                r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#,
                r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"arguments":{}}}"#,
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call"}"#,
                r#"{"jsonrpc":"2.0","id":4}"#,
            ],
        )
        .await;

        let codes: Vec<i64> = responses.iter().map(|r| r.error.as_ref().unwrap().code).collect();
        assert_eq!(
            codes,
            vec![
                code::PARSE_ERROR,
                code::METHOD_NOT_FOUND,
                code::INVALID_PARAMS,
                code::INVALID_PARAMS,
                code::INVALID_REQUEST,
            ]
        );
        assert_eq!(responses[0].id, Value::Null);
        assert_eq!(responses[4].id, json!(4));
    }

    fn parse_responses(stdout: Vec<u8>) -> Vec<JsonRpcResponse> {
        String::from_utf8(stdout)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    /// Yields `data`, then fails every read
    struct FailingInput {
        data: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for FailingInput {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
            if self.pos >= self.data.len() {
                return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "stdin reset")));
            }
            let start = self.pos;
            let n = buf.remaining().min(self.data.len() - start);
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_session_alive() {
        let handler = handler_with(StubProcessRunner::new_hang());
        let mut input = call(1, "HoleheScanner", json!({"email": "a@example.com"})).into_bytes();
        input.push(b'\n');
        input.extend_from_slice(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\",\"x\":\"\xff\xfe\"}\n");
        input.extend_from_slice(br#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#);
        input.push(b'\n');
        let mut stdout: Vec<u8> = Vec::new();

        McpServer::new(handler, CancellationToken::new())
            .run(BufReader::new(std::io::Cursor::new(input)), &mut stdout)
            .await
            .unwrap();

        let responses = parse_responses(stdout);
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].id, Value::Null);
        assert_eq!(responses[0].error.as_ref().unwrap().code, code::PARSE_ERROR);
        assert_eq!(responses[1].id, json!(3));
        assert_eq!(responses[1].result, Some(json!({})));
        assert_eq!(responses[2].id, json!(1));
        assert_eq!(responses[2].result.as_ref().unwrap()["structuredContent"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_read_failure_still_answers_in_flight_calls() {
        let handler = handler_with(StubProcessRunner::new_hang());
        let mut data = call(5, "HoleheScanner", json!({"email": "a@example.com"})).into_bytes();
        data.push(b'\n');
        let mut stdout: Vec<u8> = Vec::new();

        McpServer::new(handler, CancellationToken::new())
            .run(BufReader::new(FailingInput { data, pos: 0 }), &mut stdout)
            .await
            .unwrap();

        let responses = parse_responses(stdout);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id, json!(5));
        assert_eq!(responses[0].result.as_ref().unwrap()["structuredContent"]["status"], "cancelled");
    }

    #[tokio::test]
    async fn test_end_of_input_cancels_in_flight_calls() {
        let runner = StubProcessRunner::new_hang();
        let handler = handler_with(runner);
        let responses = run_lines(handler, &[&call(7, "HoleheScanner", json!({"email": "a@example.com"}))]).await;

        assert_eq!(responses.len(), 1);
        let result = responses[0].result.as_ref().unwrap();
        assert_eq!(result["structuredContent"]["status"], "cancelled");
        assert_eq!(result["isError"], true);
    }

    #[tokio::test]
    async fn test_cancel_notification_targets_one_call() {
        let handler = handler_with(StubProcessRunner::new_hang());
        let (mut client_in, server_in) = tokio::io::duplex(4096);
        let (server_out, client_out) = tokio::io::duplex(4096);
        let mut client_out = BufReader::new(client_out);

        let server = tokio::spawn(
            McpServer::new(handler, CancellationToken::new()).run(BufReader::new(server_in), server_out),
        );

        client_in
            .write_all(format!("{}\n", call(1, "HoleheScanner", json!({"email": "a@example.com"}))).as_bytes())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client_in
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/cancelled\",\"params\":{\"requestId\":1}}\n")
            .await
            .unwrap();

        let mut line = String::new();
        tokio::time::timeout(Duration::from_secs(2), client_out.read_line(&mut line))
            .await
            .expect("cancelled call should answer promptly")
            .unwrap();
        let response: JsonRpcResponse = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(response.id, json!(1));
        assert_eq!(response.result.unwrap()["structuredContent"]["status"], "cancelled");

        drop(client_in);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_token_ends_session() {
        let handler = handler_with(StubProcessRunner::new_stdout(""));
        let (_client_in, server_in) = tokio::io::duplex(64);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut stdout: Vec<u8> = Vec::new();
        McpServer::new(handler, shutdown)
            .run(BufReader::new(server_in), &mut stdout)
            .await
            .unwrap();
        assert!(stdout.is_empty());
    }
}
