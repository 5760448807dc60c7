//! Mock streamable-HTTP tool server built on wiremock.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use serde_json::{json, Value};
use std::time::Duration;
use toolbridge_mcp::ServerConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const SESSION_ID: &str = "sess-42";

/// A tool declaration with string parameters, the listed ones required.
pub fn tool(name: &str, params: &[&str], required: &[&str]) -> Value {
    let properties: serde_json::Map<String, Value> = params
        .iter()
        .map(|p| ((*p).to_string(), json!({"type": "string"})))
        .collect();
    json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": {"type": "object", "properties": properties, "required": required}
    })
}

/// Answers the handshake, `tools/list` and `tools/call`, echoing request ids.
///
/// `tools/call` behaviour depends on the tool name:
/// `echo` returns `text`, `slow` replies after a second, `streamed` answers
/// over an event stream, `broken` sets `isError`, `rpc_error` returns a
/// JSON-RPC error, `empty` returns an empty result, anything else returns
/// `ran <name>`.
pub struct McpResponder {
    pub tools: Vec<Value>,
    pub bearer: Option<String>,
}

impl Respond for McpResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if let Some(token) = &self.bearer {
            let expected = format!("Bearer {token}");
            let sent = request
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            if sent != Some(expected.as_str()) {
                return ResponseTemplate::new(401);
            }
        }

        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let Some(id) = body.get("id").cloned() else {
            return ResponseTemplate::new(202);
        };
        let reply = |result: Value| json!({"jsonrpc": "2.0", "id": id, "result": result});

        match body["method"].as_str().unwrap_or_default() {
            "initialize" => ResponseTemplate::new(200)
                .insert_header("Mcp-Session-Id", SESSION_ID)
                .set_body_json(reply(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "mock-http", "version": "0.0.1"}
                }))),
            "tools/list" => {
                ResponseTemplate::new(200).set_body_json(reply(json!({"tools": self.tools})))
            }
            "tools/call" => {
                let session = request
                    .headers
                    .get("mcp-session-id")
                    .and_then(|v| v.to_str().ok());
                if session != Some(SESSION_ID) {
                    return ResponseTemplate::new(400);
                }
                let name = body["params"]["name"].as_str().unwrap_or_default();
                let args = &body["params"]["arguments"];
                let text = |t: &str| json!({"content": [{"type": "text", "text": t}]});
                match name {
                    "echo" => ResponseTemplate::new(200)
                        .set_body_json(reply(text(args["text"].as_str().unwrap_or_default()))),
                    "slow" => ResponseTemplate::new(200)
                        .set_delay(Duration::from_secs(1))
                        .set_body_json(reply(text("finally"))),
                    "streamed" => {
                        let note = json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {}});
                        let payload = reply(text("streamed hello"));
                        let body = format!(
                            "event: message\ndata: {note}\n\nevent: message\ndata: {payload}\n\n"
                        );
                        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
                    }
                    "broken" => ResponseTemplate::new(200).set_body_json(reply(json!({
                        "content": [{"type": "text", "text": "boom"}],
                        "isError": true
                    }))),
                    "rpc_error" => ResponseTemplate::new(200).set_body_json(json!({
                        "jsonrpc": "2.0", "id": id,
                        "error": {"code": -32000, "message": "exploded"}
                    })),
                    "empty" => ResponseTemplate::new(200).set_body_json(reply(json!({}))),
                    other => ResponseTemplate::new(200).set_body_json(reply(text(&format!("ran {other}")))),
                }
            }
            other => ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {other}")}
            })),
        }
    }
}

/// Starts a mock server exposing `tools` at `/mcp`.
pub async fn start(tools: Vec<Value>) -> MockServer {
    start_with(McpResponder {
        tools,
        bearer: None,
    })
    .await
}

pub async fn start_with(responder: McpResponder) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(responder)
        .mount(&server)
        .await;
    server
}

/// HTTP server config pointing at `server`, with a short call deadline.
pub fn http_config(name: &str, server: &MockServer) -> ServerConfig {
    ServerConfig::http(name, format!("{}/mcp", server.uri()))
        .with_call_timeout(Duration::from_millis(300))
}
