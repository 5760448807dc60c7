//! Plain HTTP transport: each JSON-RPC message is one POST. The server may
//! answer with a JSON body or with a short `text/event-stream` that ends once
//! the response has been sent.

use super::sse::SseDecoder;
use super::{build_headers, map_reqwest_error, timeout_error};
use crate::config::HttpParams;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use toolbridge_core::{BridgeError, BridgeResult};
use tracing::debug;

/// Header carrying the server-assigned session id.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// A server reached with one POST per message.
pub struct HttpTransport {
    server: String,
    client: Client,
    url: Url,
    session_id: parking_lot::Mutex<Option<String>>,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Builds the client. No request is sent until the handshake.
    pub fn new(server: &str, params: &HttpParams, connect_timeout: Duration) -> BridgeResult<Self> {
        let url = Url::parse(&params.url)
            .map_err(|e| BridgeError::Config(format!("invalid HTTP url '{}': {e}", params.url)))?;
        let client = Client::builder()
            .default_headers(build_headers(params)?)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| BridgeError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            server: server.to_string(),
            client,
            url,
            session_id: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    async fn post(&self, body: String) -> BridgeResult<Response> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::SessionClosed(format!(
                "transport of '{}' is closed",
                self.server
            )));
        }
        let mut builder = self
            .client
            .post(self.url.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(session) = self.session_id.lock().clone() {
            builder = builder.header(SESSION_HEADER, session);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&format!("POST to '{}'", self.server), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Connection(format!(
                "server '{}' answered {status}",
                self.server
            )));
        }
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock() = Some(session.to_string());
        }
        Ok(response)
    }

    pub async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> BridgeResult<JsonRpcResponse> {
        let id = request.id;
        let method = request.method.clone();
        let body = serde_json::to_string(&request)?;

        let exchange = async {
            let response = self.post(body).await?;
            if is_event_stream(&response) {
                self.read_stream(response, id).await
            } else {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| map_reqwest_error("reading response body", e))?;
                let resp: JsonRpcResponse = serde_json::from_slice(&bytes).map_err(|e| {
                    BridgeError::Protocol(format!("invalid JSON-RPC response: {e}"))
                })?;
                if resp.response_id() != Some(id) {
                    return Err(BridgeError::Protocol(format!(
                        "expected response to request {id}, got {:?}",
                        resp.id
                    )));
                }
                Ok(resp)
            }
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| timeout_error(&method, timeout))?
    }

    async fn read_stream(&self, response: Response, id: u64) -> BridgeResult<JsonRpcResponse> {
        let mut decoder = SseDecoder::default();
        let mut stream = response.bytes_stream();
        let matches = |data: &str| -> Option<JsonRpcResponse> {
            match serde_json::from_str::<JsonRpcResponse>(data) {
                Ok(resp) if resp.response_id() == Some(id) => Some(resp),
                Ok(_) => {
                    debug!(server = %self.server, "skipping unrelated streamed message");
                    None
                }
                Err(e) => {
                    debug!(server = %self.server, error = %e, "non-JSON-RPC streamed payload");
                    None
                }
            }
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_reqwest_error("reading event stream", e))?;
            for event in decoder.push(&chunk) {
                if let Some(resp) = matches(&event.data) {
                    return Ok(resp);
                }
            }
        }
        if let Some(resp) = decoder.finish().and_then(|event| matches(&event.data)) {
            return Ok(resp);
        }
        Err(BridgeError::Protocol(format!(
            "event stream from '{}' ended without a response to request {id}",
            self.server
        )))
    }

    pub async fn notify(&self, notification: JsonRpcNotification) -> BridgeResult<()> {
        let body = serde_json::to_string(&notification)?;
        self.post(body).await.map(|_| ())
    }

    pub fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("text/event-stream"))
}
