//! Demo tool server speaking newline-delimited JSON-RPC on stdin/stdout.
//!
//! Tools: `calculator`, `echo`, `timestamp`, `math_functions`, `sleep`.
//! Every request runs on its own task, so a slow `sleep` never blocks
//! later calls. Logs go to stderr; stdout carries protocol messages only.

use chrono::Utc;
use clap::Parser;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use toolbridge_mcp::PROTOCOL_VERSION;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone, Copy)]
#[command(name = "toolbridge-example-server", about = "Demo stdio tool server")]
struct Args {
    /// Split `tools/list` into pages of this many tools (0 = one page).
    #[arg(long, default_value_t = 0)]
    page_size: usize,
}

fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "calculator",
            "description": "Perform basic arithmetic calculations",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Mathematical expression to evaluate (e.g., '2 + 3 * 4')"
                    }
                },
                "required": ["expression"]
            }
        }),
        json!({
            "name": "echo",
            "description": "Echo back the provided text",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to echo back"}
                },
                "required": ["text"]
            }
        }),
        json!({
            "name": "timestamp",
            "description": "Get current timestamp",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "format": {
                        "type": "string",
                        "description": "Timestamp format ('iso', 'unix', or 'readable')",
                        "default": "iso"
                    }
                }
            }
        }),
        json!({
            "name": "math_functions",
            "description": "Advanced mathematical functions",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "function": {
                        "type": "string",
                        "description": "Math function to use",
                        "enum": ["sin", "cos", "tan", "log", "sqrt", "factorial"]
                    },
                    "value": {"type": "number", "description": "Input value for the function"}
                },
                "required": ["function", "value"]
            }
        }),
        json!({
            "name": "sleep",
            "description": "Wait for the given number of milliseconds, then reply",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "millis": {"type": "integer", "description": "Delay in milliseconds"}
                },
                "required": ["millis"]
            }
        }),
    ]
}

fn text_result(text: impl Into<String>) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}]})
}

fn error_result(text: impl Into<String>) -> Value {
    json!({"content": [{"type": "text", "text": text.into()}], "isError": true})
}

fn math_function(function: &str, value: f64) -> Result<f64, String> {
    match function {
        "sin" => Ok(value.to_radians().sin()),
        "cos" => Ok(value.to_radians().cos()),
        "tan" => Ok(value.to_radians().tan()),
        "log" if value > 0.0 => Ok(value.ln()),
        "log" => Err("math domain error".into()),
        "sqrt" if value >= 0.0 => Ok(value.sqrt()),
        "sqrt" => Err("math domain error".into()),
        "factorial" => {
            if value < 0.0 || value.fract() != 0.0 {
                return Err("factorial is only defined for non-negative integers".into());
            }
            if value > 170.0 {
                return Err("factorial result is too large".into());
            }
            Ok((1..=value as u64).map(|n| n as f64).product())
        }
        other => Err(format!("Unknown function: {other}")),
    }
}

async fn call_tool(name: &str, args: &Value) -> Value {
    match name {
        "calculator" => {
            let expression = args["expression"].as_str().unwrap_or_default().trim();
            match toolbridge_builtins::evaluate(expression) {
                Ok(value) => text_result(format!(
                    "Calculation result: {expression} = {}",
                    toolbridge_builtins::format_number(value)
                )),
                Err(e) => error_result(format!(
                    "Unable to calculate '{expression}': {}",
                    e.description()
                )),
            }
        }
        "echo" => match args["text"].as_str() {
            Some(text) => text_result(text),
            None => error_result("'text' must be a string"),
        },
        "timestamp" => {
            let format = args["format"].as_str().unwrap_or("iso");
            let now = Utc::now();
            let stamp = match format {
                "unix" => now.timestamp().to_string(),
                "readable" => now.format("%Y-%m-%d %H:%M:%S").to_string(),
                _ => now.to_rfc3339(),
            };
            text_result(format!("Current timestamp ({format}): {stamp}"))
        }
        "math_functions" => {
            let function = args["function"].as_str().unwrap_or_default();
            let Some(value) = args["value"].as_f64() else {
                return error_result("'value' must be a number");
            };
            match math_function(function, value) {
                Ok(result) => text_result(format!(
                    "{function}({value}) = {}",
                    toolbridge_builtins::format_number(result)
                )),
                Err(e) => error_result(format!("Unable to calculate {function}({value}): {e}")),
            }
        }
        "sleep" => {
            let millis = args["millis"].as_u64().unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
            text_result(format!("slept {millis}ms"))
        }
        other => error_result(format!("Unknown tool: {other}")),
    }
}

fn list_tools(params: &Value, page_size: usize) -> Value {
    let tools = tool_definitions();
    if page_size == 0 {
        return json!({ "tools": tools });
    }
    let start = params["cursor"]
        .as_str()
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(0)
        .min(tools.len());
    let end = (start + page_size).min(tools.len());
    let mut result = json!({ "tools": tools[start..end].to_vec() });
    if end < tools.len() {
        result["nextCursor"] = Value::String(end.to_string());
    }
    result
}

async fn handle(message: Value, args: Args) -> Option<Value> {
    let id = message.get("id").cloned()?;
    let method = message["method"].as_str().unwrap_or_default();
    let params = message.get("params").cloned().unwrap_or(Value::Null);

    let outcome: Result<Value, (i64, String)> = match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": "toolbridge-example-server",
                "version": env!("CARGO_PKG_VERSION")
            }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(list_tools(&params, args.page_size)),
        "tools/call" => match params["name"].as_str() {
            Some(name) => {
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                Ok(call_tool(name, &arguments).await)
            }
            None => Err((-32602, "missing tool name".into())),
        },
        other => Err((-32601, format!("Method not found: {other}"))),
    };

    Some(match outcome {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => {
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
        }
    })
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(page_size = args.page_size, "example server starting");

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "ignoring malformed line");
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = handle(message, args).await {
                let _ = tx.send(response.to_string());
            }
        });
    }

    info!("stdin closed, shutting down");
    drop(tx);
    writer.abort();
    Ok(())
}
