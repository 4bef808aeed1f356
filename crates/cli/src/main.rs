//! WhiteRabbit CLI - Command-line client for the WhiteRabbit MCP TCP transport
//! Start the daemon with `WHITERABBIT_TRANSPORT=tcp` first.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9627";

#[derive(Parser)]
#[command(name = "whiterabbit")]
#[command(about = "WhiteRabbit MCP CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "WHITERABBIT_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tool catalogue
    Tools {
        /// Print each tool's input schema as well
        #[arg(long)]
        schema: bool,
    },

    /// Invoke a tool
    Call {
        /// Tool name (e.g., NmapScanner)
        tool: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Persist the result under this folder
        #[arg(long)]
        output_dir: Option<String>,

        /// Print the raw result JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show server status
    Status,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Tabled)]
struct ToolRow {
    name: String,
    description: String,
}

async fn call_rpc(url: &str, method: &str, params: Value) -> Result<Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

/// `--args` merged with `--output-dir`
fn call_arguments(args: &str, output_dir: Option<String>) -> Result<Value> {
    let mut arguments: Value = serde_json::from_str(args).context("Invalid JSON arguments")?;
    let map = arguments
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("--args must be a JSON object"))?;
    if let Some(dir) = output_dir {
        map.insert("output_dir".to_string(), Value::String(dir));
    }
    Ok(arguments)
}

/// Process exit code for an invocation status
fn exit_code(status: &str) -> i32 {
    match status {
        "succeeded" => 0,
        "invalid_input" => 2,
        "timed_out" => 3,
        "cancelled" => 4,
        _ => 1,
    }
}

fn tool_rows(list: &Value) -> Vec<ToolRow> {
    list["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .map(|tool| ToolRow {
                    name: tool["name"].as_str().unwrap_or_default().to_string(),
                    description: tool["description"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn print_result(result: &Value) {
    let status = result["status"].as_str().unwrap_or("unknown");
    let headline = format!("{} {}", result["tool"].as_str().unwrap_or("?"), status);
    if status == "succeeded" {
        println!("{}", format!("✓ {}", headline).green().bold());
    } else {
        println!("{}", format!("✗ {}", headline).red().bold());
    }
    println!();
    println!("  {} {}", "Invocation:".bold(), result["id"].as_str().unwrap_or("?"));
    println!("  {} {} ms", "Duration:".bold(), result["duration_ms"]);
    if let Some(code) = result["exit_code"].as_i64() {
        println!("  {} {}", "Exit code:".bold(), code);
    }
    if result["truncated"].as_bool().unwrap_or(false) {
        println!("  {}", "Output truncated at the capture limit".yellow());
    }
    if result["parse_degraded"].as_bool().unwrap_or(false) {
        println!("  {}", "Structured parsing failed; showing raw output".yellow());
    }
    if let Some(path) = result["saved_to"].as_str() {
        println!("  {} {}", "Saved to:".bold(), path);
    }
    if let Some(warnings) = result["warnings"].as_array() {
        for warning in warnings {
            println!("  {} {}", "Warning:".yellow().bold(), warning.as_str().unwrap_or_default());
        }
    }
    if let Some(error) = result["error"].as_object() {
        println!(
            "  {} [{}] {}",
            "Error:".red().bold(),
            error.get("kind").and_then(Value::as_str).unwrap_or("?"),
            error.get("message").and_then(Value::as_str).unwrap_or_default()
        );
    }
    if !result["output"].is_null() {
        println!();
        match &result["output"] {
            Value::String(text) => println!("{}", text),
            other => println!("{}", serde_json::to_string_pretty(other).unwrap_or_default()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tools { schema } => {
            let list = call_rpc(&cli.rpc_url, "tools/list", json!({})).await?;
            if schema {
                println!("{}", serde_json::to_string_pretty(&list["tools"])?);
            } else {
                println!("{}", Table::new(tool_rows(&list)));
            }
        }

        Commands::Call {
            tool,
            args,
            output_dir,
            json,
        } => {
            let params = json!({
                "name": tool,
                "arguments": call_arguments(&args, output_dir)?,
            });

            let response = call_rpc(&cli.rpc_url, "tools/call", params).await?;
            let result = &response["structuredContent"];
            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                print_result(result);
            }

            let code = exit_code(result["status"].as_str().unwrap_or_default());
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Status => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!("  {} {}", "Version:".bold(), stats["version"].as_str().unwrap_or("?"));
                    println!();
                    println!("  {} {}", "Tools:".bold(), stats["tools"]);
                    let limit = stats["max_concurrent"]
                        .as_u64()
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "unlimited".to_string());
                    println!("  {} {}", "Max concurrent:".bold(), limit);
                    println!("  {} {}", "Running:".bold(), stats["running"]);
                    println!("  {} {}", "Waiting:".bold(), stats["waiting"]);
                    println!("  {} {}", "In flight:".bold(), stats["in_flight"]);
                    println!("  {} {}", "Processes spawned:".bold(), stats["spawn_count"]);
                    if let Some(completed) = stats["completed"].as_object() {
                        for (status, count) in completed {
                            println!("  {} {}", format!("{}:", status).bold(), count);
                        }
                    }
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_arguments_merges_output_dir() {
        let args = call_arguments(r#"{"target": "example.com"}"#, Some("out".into())).unwrap();
        assert_eq!(args, json!({"target": "example.com", "output_dir": "out"}));
    }

    #[test]
    fn test_call_arguments_must_be_object() {
        assert!(call_arguments("[1, 2]", None).is_err());
        assert!(call_arguments("not json", None).is_err());
    }

    #[test]
    fn test_exit_code_follows_status() {
        assert_eq!(exit_code("succeeded"), 0);
        assert_eq!(exit_code("failed"), 1);
        assert_eq!(exit_code("invalid_input"), 2);
        assert_eq!(exit_code("timed_out"), 3);
    }

    #[test]
    fn test_tool_rows() {
        let list = json!({"tools": [{"name": "NmapScanner", "description": "Port scan", "inputSchema": {}}]});
        let rows = tool_rows(&list);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "NmapScanner");
        assert!(tool_rows(&json!({})).is_empty());
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::try_parse_from(["whiterabbit", "call", "HoleheScanner", "--args", r#"{"email":"a@b.c"}"#]).unwrap();
        assert!(matches!(cli.command, Commands::Call { ref tool, .. } if tool == "HoleheScanner"));
        assert_eq!(cli.rpc_url, DEFAULT_RPC_URL);
    }
}
