//! The three wire transports behind one closed enum.
//!
//! Every variant moves JSON-RPC messages. The
//! [`TransportSession`](crate::session::TransportSession) layered on top
//! owns the handshake, discovery and result normalization.

use crate::config::{HttpParams, ServerConfig, TransportConfig};
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use toolbridge_core::{BridgeError, BridgeResult};

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// A live connection to one tool server.
pub enum Transport {
    Stdio(StdioTransport),
    Sse(SseTransport),
    Http(HttpTransport),
}

impl Transport {
    /// Establishes the underlying connection. No JSON-RPC traffic is sent.
    pub async fn open(config: &ServerConfig) -> BridgeResult<Self> {
        let connect_timeout = config.connect_timeout();
        match &config.transport {
            TransportConfig::Stdio(params) => {
                Ok(Transport::Stdio(StdioTransport::spawn(&config.name, params)?))
            }
            TransportConfig::Sse(params) => Ok(Transport::Sse(
                SseTransport::connect(&config.name, params, connect_timeout).await?,
            )),
            TransportConfig::Http(params) => Ok(Transport::Http(HttpTransport::new(
                &config.name,
                params,
                connect_timeout,
            )?)),
        }
    }

    /// Sends a request and waits up to `timeout` for the matching response.
    pub async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> BridgeResult<JsonRpcResponse> {
        match self {
            Transport::Stdio(t) => t.request(request, timeout).await,
            Transport::Sse(t) => t.request(request, timeout).await,
            Transport::Http(t) => t.request(request, timeout).await,
        }
    }

    /// Sends a notification. No response is awaited.
    pub async fn notify(&self, notification: JsonRpcNotification) -> BridgeResult<()> {
        match self {
            Transport::Stdio(t) => t.notify(notification).await,
            Transport::Sse(t) => t.notify(notification).await,
            Transport::Http(t) => t.notify(notification).await,
        }
    }

    /// False once the connection is gone and cannot carry further calls.
    pub fn is_alive(&self) -> bool {
        match self {
            Transport::Stdio(t) => t.is_alive(),
            Transport::Sse(t) => t.is_alive(),
            Transport::Http(t) => t.is_alive(),
        }
    }

    /// Tears the connection down. Safe to call more than once.
    pub async fn close(&self) -> BridgeResult<()> {
        match self {
            Transport::Stdio(t) => t.close().await,
            Transport::Sse(t) => {
                t.close();
                Ok(())
            }
            Transport::Http(t) => {
                t.close();
                Ok(())
            }
        }
    }
}

/// In-flight requests awaiting a response, keyed by JSON-RPC id.
///
/// Resolved by the transport's reader task; a caller that gives up removes
/// its own slot so a late response is dropped.
#[derive(Clone, Default)]
pub(crate) struct PendingRequests {
    slots: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
}

impl PendingRequests {
    pub(crate) fn register(&self, id: u64) -> oneshot::Receiver<JsonRpcResponse> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id, tx);
        rx
    }

    /// Hands a response to its waiting caller. Returns false when nobody
    /// is waiting for that id.
    pub(crate) fn resolve(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.response_id() else {
            return false;
        };
        match self.slots.lock().remove(&id) {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    pub(crate) fn cancel(&self, id: u64) {
        self.slots.lock().remove(&id);
    }

    /// Drops every slot; waiting callers observe a closed channel.
    pub(crate) fn fail_all(&self) {
        self.slots.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Runs `exchange` (send + wait) under `timeout`, cleaning up the pending
/// slot when the deadline passes.
pub(crate) async fn await_with_deadline<F>(
    pending: &PendingRequests,
    id: u64,
    method: &str,
    timeout: Duration,
    exchange: F,
) -> BridgeResult<JsonRpcResponse>
where
    F: std::future::Future<Output = BridgeResult<JsonRpcResponse>>,
{
    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => {
            if result.is_err() {
                pending.cancel(id);
            }
            result
        }
        Err(_) => {
            pending.cancel(id);
            Err(timeout_error(method, timeout))
        }
    }
}

pub(crate) fn timeout_error(method: &str, timeout: Duration) -> BridgeError {
    BridgeError::Timeout(format!(
        "'{method}' did not complete within {}ms",
        timeout.as_millis()
    ))
}

/// Header map shared by the HTTP-based transports.
pub(crate) fn build_headers(params: &HttpParams) -> BridgeResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in &params.headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| BridgeError::Config(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| BridgeError::Config(format!("invalid value for header '{key}': {e}")))?;
        headers.insert(name, value);
    }
    if let Some(token) = &params.bearer_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| BridgeError::Config(format!("invalid bearer token: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Maps a reqwest failure onto the error taxonomy.
pub(crate) fn map_reqwest_error(context: &str, err: reqwest::Error) -> BridgeError {
    if err.is_timeout() {
        BridgeError::Timeout(format!("{context}: {err}"))
    } else if err.is_decode() {
        BridgeError::Protocol(format!("{context}: {err}"))
    } else {
        BridgeError::Connection(format!("{context}: {err}"))
    }
}
