//! One connection to one tool server, independent of the wire transport.

use crate::config::{ServerConfig, TransportKind};
use crate::protocol::{
    initialize_params, InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    McpToolResult, ServerInfo,
};
use crate::translate::translate_all;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use toolbridge_core::{Arguments, BridgeError, BridgeResult, ErrorKind, InvocationResult};
use toolbridge_tools::ToolDescriptor;
use tracing::{debug, info, warn};

/// Upper bound on `tools/list` pages, in case a server keeps handing out cursors.
const MAX_DISCOVERY_PAGES: usize = 100;

/// Lifecycle of a [`TransportSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, `connect()` not yet called.
    Unconnected,
    /// Transport opening or handshake in flight.
    Connecting,
    /// Handshake done; discovery and calls are allowed.
    Ready,
    /// Terminal. Reached by `close()` or by a failed connection attempt.
    Closed,
}

/// Owns exactly one transport and speaks the handshake, discovery and
/// invocation messages over it.
///
/// No lock is held across an await: the transport handle is cloned out of
/// its slot before any I/O.
pub struct TransportSession {
    config: ServerConfig,
    state: RwLock<SessionState>,
    transport: RwLock<Option<Arc<Transport>>>,
    next_id: AtomicU64,
    server_info: RwLock<Option<ServerInfo>>,
    last_error: RwLock<Option<String>>,
    connected_at: RwLock<Option<DateTime<Utc>>>,
}

impl TransportSession {
    /// A session for `config`. Nothing is opened until [`connect`](Self::connect).
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(SessionState::Unconnected),
            transport: RwLock::new(None),
            next_id: AtomicU64::new(1),
            server_info: RwLock::new(None),
            last_error: RwLock::new(None),
            connected_at: RwLock::new(None),
        }
    }

    /// The server name from the config.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The config this session was built from.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Which wire transport the config selects.
    pub fn kind(&self) -> TransportKind {
        self.config.kind()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// True while calls are allowed.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Name and version the server reported during the handshake.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().clone()
    }

    /// The most recent connection failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// When the handshake completed.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        *self.connected_at.read()
    }

    /// Opens the transport and performs the `initialize` handshake.
    ///
    /// Only valid from `Unconnected`. Any failure closes whatever was opened,
    /// records the cause and leaves the session `Closed`. There is no retry.
    pub async fn connect(&self) -> BridgeResult<()> {
        {
            let mut state = self.state.write();
            match *state {
                SessionState::Unconnected => *state = SessionState::Connecting,
                SessionState::Closed => {
                    return Err(BridgeError::SessionClosed(format!(
                        "session '{}' is closed",
                        self.name()
                    )))
                }
                other => {
                    return Err(BridgeError::Connection(format!(
                        "session '{}' cannot connect while {other:?}",
                        self.name()
                    )))
                }
            }
        }

        let deadline = self.config.connect_timeout();
        let outcome = match tokio::time::timeout(deadline, self.establish(deadline)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(BridgeError::Timeout(format!(
                "no handshake within {}ms",
                deadline.as_millis()
            ))),
        };

        match outcome {
            Ok(init) => {
                {
                    let mut state = self.state.write();
                    if *state == SessionState::Connecting {
                        *self.server_info.write() = init.server_info;
                        *self.connected_at.write() = Some(Utc::now());
                        *state = SessionState::Ready;
                        info!(
                            server = %self.name(),
                            transport = %self.kind(),
                            version = %init.protocol_version,
                            "session ready"
                        );
                        return Ok(());
                    }
                }
                // close() ran while the handshake was in flight.
                let transport = self.transport.write().take();
                if let Some(transport) = transport {
                    if let Err(e) = transport.close().await {
                        debug!(server = %self.name(), error = %e, "close after cancelled connect");
                    }
                }
                Err(BridgeError::SessionClosed(format!(
                    "session '{}' was closed while connecting",
                    self.name()
                )))
            }
            Err(cause) => {
                let message = cause.to_string();
                warn!(server = %self.name(), error = %message, "connection failed");
                *self.last_error.write() = Some(message.clone());
                *self.state.write() = SessionState::Closed;
                let transport = self.transport.write().take();
                if let Some(transport) = transport {
                    if let Err(e) = transport.close().await {
                        debug!(server = %self.name(), error = %e, "close after failed connect");
                    }
                }
                Err(match cause {
                    BridgeError::Connection(_) => cause,
                    other => BridgeError::Connection(format!(
                        "failed to connect to '{}': {other}",
                        self.name()
                    )),
                })
            }
        }
    }

    async fn establish(&self, deadline: Duration) -> BridgeResult<InitializeResult> {
        let transport = Arc::new(Transport::open(&self.config).await?);
        *self.transport.write() = Some(transport.clone());

        let request = JsonRpcRequest::new(self.next_id(), "initialize", Some(initialize_params()));
        let response = transport.request(request, deadline).await?;
        let init: InitializeResult = serde_json::from_value(expect_result(response, "initialize")?)
            .map_err(|e| BridgeError::Protocol(format!("invalid initialize result: {e}")))?;

        transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;
        Ok(init)
    }

    /// Lists the server's tools, following `nextCursor` pagination, in the
    /// order the server advertises them.
    pub async fn discover(&self) -> BridgeResult<Vec<ToolDescriptor>> {
        let transport = self.live_transport()?;
        let timeout = self.config.call_timeout();
        let mut raw_tools: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_DISCOVERY_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let request = JsonRpcRequest::new(self.next_id(), "tools/list", params);
            let result = expect_result(transport.request(request, timeout).await?, "tools/list")?;

            match result.get("tools") {
                Some(Value::Array(tools)) => raw_tools.extend(tools.iter().cloned()),
                _ => {
                    return Err(BridgeError::Protocol(
                        "tools/list result has no 'tools' array".into(),
                    ))
                }
            }
            cursor = result
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                let descriptors = translate_all(&raw_tools)?;
                info!(server = %self.name(), tools = descriptors.len(), "tools discovered");
                return Ok(descriptors);
            }
        }

        Err(BridgeError::Protocol(format!(
            "tools/list did not finish within {MAX_DISCOVERY_PAGES} pages"
        )))
    }

    /// Invokes a tool.
    ///
    /// Remote failures (timeouts, protocol violations, tool errors) come back
    /// as a failed [`InvocationResult`]. Only a closed session is an `Err`.
    pub async fn call(
        &self,
        name: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> BridgeResult<InvocationResult> {
        let transport = self.live_transport()?;
        if !transport.is_alive() {
            self.mark_lost("transport is no longer alive");
            return Err(BridgeError::SessionClosed(format!(
                "session '{}' lost its connection",
                self.name()
            )));
        }

        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let request = JsonRpcRequest::new(self.next_id(), "tools/call", Some(params));
        match transport.request(request, timeout).await {
            Ok(response) => Ok(normalize_call_response(response)),
            Err(err @ BridgeError::SessionClosed(_)) => Err(err),
            Err(err) => {
                if !transport.is_alive() {
                    self.mark_lost(&err.to_string());
                }
                debug!(server = %self.name(), tool = %name, error = %err, "call failed");
                Ok(InvocationResult::from_error(&err))
            }
        }
    }

    /// Closes the transport. Idempotent and safe from any state.
    pub async fn close(&self) -> BridgeResult<()> {
        *self.state.write() = SessionState::Closed;
        let transport = self.transport.write().take();
        match transport {
            Some(transport) => {
                let result = transport.close().await;
                debug!(server = %self.name(), "session closed");
                result
            }
            None => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn live_transport(&self) -> BridgeResult<Arc<Transport>> {
        if self.state() != SessionState::Ready {
            return Err(BridgeError::SessionClosed(format!(
                "session '{}' is not ready ({:?})",
                self.name(),
                self.state()
            )));
        }
        self.transport.read().clone().ok_or_else(|| {
            BridgeError::SessionClosed(format!("session '{}' has no transport", self.name()))
        })
    }

    fn mark_lost(&self, reason: &str) {
        warn!(server = %self.name(), reason = %reason, "session lost");
        *self.last_error.write() = Some(reason.to_string());
        *self.state.write() = SessionState::Closed;
    }
}

fn expect_result(response: JsonRpcResponse, method: &str) -> BridgeResult<Value> {
    if let Some(err) = response.error {
        return Err(BridgeError::Protocol(format!(
            "'{method}' failed with {}: {}",
            err.code, err.message
        )));
    }
    response
        .result
        .ok_or_else(|| BridgeError::Protocol(format!("'{method}' response has no result")))
}

fn normalize_call_response(response: JsonRpcResponse) -> InvocationResult {
    if let Some(err) = response.error {
        return InvocationResult::failure(
            ErrorKind::RemoteTool,
            format!("{}: {}", err.code, err.message),
        );
    }
    let Some(result) = response.result else {
        return InvocationResult::failure(
            ErrorKind::Protocol,
            "tools/call response carries neither result nor error",
        );
    };
    match serde_json::from_value::<McpToolResult>(result) {
        Ok(result) => result.into_invocation(),
        Err(e) => {
            InvocationResult::failure(ErrorKind::Protocol, format!("malformed tool result: {e}"))
        }
    }
}
