//! SSE transport: a long-lived `text/event-stream` GET carries server
//! messages, and client messages are POSTed to the URL announced by the
//! server's `endpoint` event.

use super::{await_with_deadline, build_headers, map_reqwest_error, PendingRequests};
use crate::config::HttpParams;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use toolbridge_core::{BridgeError, BridgeResult};
use tracing::{debug, warn};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, `None` when the default `message`.
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes arrive in arbitrary chunks; complete events are returned once the
/// terminating blank line has been seen.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some(pos) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let newline = start + pos;
            let mut end = newline;
            if end > start && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = newline + 1;
            if let Some(event) = self.feed_line(&line) {
                events.push(event);
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        events
    }

    /// Flushes a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            if let Some(event) = self.feed_line(&line) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: self.event.take(),
            data,
        })
    }
}

/// A connected SSE server.
pub struct SseTransport {
    server: String,
    client: Client,
    endpoint: Url,
    pending: PendingRequests,
    alive: Arc<AtomicBool>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Opens the event stream and waits for the server to announce its
    /// message endpoint.
    pub async fn connect(
        server: &str,
        params: &HttpParams,
        connect_timeout: Duration,
    ) -> BridgeResult<Self> {
        let base = Url::parse(&params.url)
            .map_err(|e| BridgeError::Config(format!("invalid SSE url '{}': {e}", params.url)))?;
        let client = Client::builder()
            .default_headers(build_headers(params)?)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| BridgeError::Connection(format!("failed to build HTTP client: {e}")))?;

        let response = tokio::time::timeout(
            connect_timeout,
            client
                .get(base.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| {
            BridgeError::Connection(format!(
                "SSE server '{server}' did not respond within {}ms",
                connect_timeout.as_millis()
            ))
        })?
        .map_err(|e| BridgeError::Connection(format!("SSE connect to '{server}' failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Connection(format!(
                "SSE server '{server}' answered {status}"
            )));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !content_type.starts_with("text/event-stream") {
            return Err(BridgeError::Connection(format!(
                "SSE server '{server}' returned content type '{content_type}'"
            )));
        }

        let pending = PendingRequests::default();
        let alive = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();

        let reader = {
            let pending = pending.clone();
            let alive = alive.clone();
            let server = server.to_string();
            tokio::spawn(async move {
                let mut endpoint_tx = Some(endpoint_tx);
                let mut decoder = SseDecoder::default();
                let mut stream = response.bytes_stream();
                let handle = |event: SseEvent, endpoint_tx: &mut Option<oneshot::Sender<String>>| {
                    match event.name() {
                        "endpoint" => match endpoint_tx.take() {
                            Some(tx) => {
                                let _ = tx.send(event.data.trim().to_string());
                            }
                            None => debug!(server = %server, "ignoring repeated endpoint event"),
                        },
                        "message" => match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                            Ok(resp) => {
                                if !pending.resolve(resp) {
                                    debug!(server = %server, "dropping unmatched message");
                                }
                            }
                            Err(e) => {
                                debug!(server = %server, error = %e, "non-JSON-RPC SSE payload")
                            }
                        },
                        other => debug!(server = %server, event = %other, "ignoring SSE event"),
                    }
                };

                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            for event in decoder.push(&bytes) {
                                handle(event, &mut endpoint_tx);
                            }
                        }
                        Err(e) => {
                            warn!(server = %server, error = %e, "SSE stream failed");
                            break;
                        }
                    }
                }
                if let Some(event) = decoder.finish() {
                    handle(event, &mut endpoint_tx);
                }
                debug!(server = %server, "SSE stream ended");
                alive.store(false, Ordering::SeqCst);
                pending.fail_all();
            })
        };

        let endpoint = match tokio::time::timeout(connect_timeout, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                reader.abort();
                return Err(BridgeError::Connection(format!(
                    "SSE stream of '{server}' ended before an endpoint was announced"
                )));
            }
            Err(_) => {
                reader.abort();
                return Err(BridgeError::Connection(format!(
                    "SSE server '{server}' announced no endpoint within {}ms",
                    connect_timeout.as_millis()
                )));
            }
        };
        let endpoint = base.join(&endpoint).map_err(|e| {
            reader.abort();
            BridgeError::Protocol(format!("invalid endpoint '{endpoint}': {e}"))
        })?;
        debug!(server = %server, endpoint = %endpoint, "SSE endpoint announced");

        Ok(Self {
            server: server.to_string(),
            client,
            endpoint,
            pending,
            alive,
            reader: parking_lot::Mutex::new(Some(reader)),
        })
    }

    async fn post(&self, body: String) -> BridgeResult<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&format!("POST to '{}'", self.server), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Connection(format!(
                "server '{}' rejected message with {status}",
                self.server
            )));
        }
        Ok(())
    }

    pub async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> BridgeResult<JsonRpcResponse> {
        if !self.is_alive() {
            return Err(BridgeError::Connection(format!(
                "SSE stream of '{}' is closed",
                self.server
            )));
        }
        let id = request.id;
        let method = request.method.clone();
        let body = serde_json::to_string(&request)?;
        let rx = self.pending.register(id);

        await_with_deadline(&self.pending, id, &method, timeout, async {
            self.post(body).await?;
            rx.await.map_err(|_| {
                BridgeError::Connection(format!(
                    "SSE stream of '{}' closed before answering '{method}'",
                    self.server
                ))
            })
        })
        .await
    }

    pub async fn notify(&self, notification: JsonRpcNotification) -> BridgeResult<()> {
        let body = serde_json::to_string(&notification)?;
        self.post(body).await
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.pending.fail_all();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}
