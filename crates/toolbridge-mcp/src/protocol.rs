//! MCP (Model Context Protocol) JSON-RPC 2.0 message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolbridge_core::{ContentBlock, ErrorKind, InvocationResult};

/// Protocol revision sent in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params: params.unwrap_or_else(|| serde_json::json!({})),
        }
    }
}

/// Any JSON-RPC 2.0 message received from a server.
///
/// Responses carry an `id` and no `method`; server-initiated requests and
/// notifications carry a `method` and are not matched against pending calls.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The id this message answers, if it is a response.
    pub fn response_id(&self) -> Option<u64> {
        if self.method.is_some() {
            None
        } else {
            self.id
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// MCP tool call result from the `tools/call` response.
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Option<Vec<Value>>,
    #[serde(default, rename = "structuredContent")]
    pub structured_content: Option<Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl McpToolResult {
    /// Normalizes the raw result.
    ///
    /// `text` blocks become text; every other block kind, and any
    /// `structuredContent`, is kept as a structured block. A result with
    /// neither content nor an error flag is a protocol error.
    pub fn into_invocation(self) -> InvocationResult {
        if self.content.is_none() && self.structured_content.is_none() && !self.is_error {
            return InvocationResult::failure(
                ErrorKind::Protocol,
                "tool result carries neither content nor an error",
            );
        }

        let mut blocks: Vec<ContentBlock> = self
            .content
            .unwrap_or_default()
            .into_iter()
            .map(content_block)
            .collect();
        if let Some(structured) = self.structured_content {
            blocks.push(ContentBlock::structured(structured));
        }

        if self.is_error {
            let text = blocks
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n");
            let message = if text.is_empty() {
                "tool reported an error without details".to_string()
            } else {
                text
            };
            InvocationResult::failure(ErrorKind::RemoteTool, message)
        } else {
            InvocationResult::success(blocks)
        }
    }
}

fn content_block(raw: Value) -> ContentBlock {
    if raw.get("type").and_then(Value::as_str) == Some("text") {
        if let Some(text) = raw.get("text").and_then(Value::as_str) {
            return ContentBlock::text(text);
        }
    }
    ContentBlock::structured(raw)
}

/// MCP server capabilities from the `initialize` response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub resources: Option<Value>,
    #[serde(default)]
    pub prompts: Option<Value>,
}

/// MCP initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Parameters for the client side of the `initialize` handshake.
pub fn initialize_params() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolbridge",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
