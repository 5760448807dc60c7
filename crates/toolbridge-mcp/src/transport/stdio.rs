//! Subprocess transport: newline-delimited JSON-RPC over the child's
//! stdin/stdout. The child's stderr is drained into debug logs.

use super::{await_with_deadline, PendingRequests};
use crate::config::StdioParams;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use toolbridge_core::{BridgeError, BridgeResult};
use tracing::{debug, warn};

/// How long a child gets to exit on its own after stdin is closed.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// A spawned tool server.
pub struct StdioTransport {
    server: String,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
    pending: PendingRequests,
    alive: Arc<AtomicBool>,
    reader: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawns the configured command with piped stdio.
    pub fn spawn(server: &str, params: &StdioParams) -> BridgeResult<Self> {
        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &params.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            BridgeError::Connection(format!(
                "failed to spawn '{}' for server '{server}': {e}",
                params.command
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Connection("child stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Connection("child stdout not available".into()))?;

        if let Some(stderr) = child.stderr.take() {
            let server = server.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "{line}");
                }
            });
        }

        let pending = PendingRequests::default();
        let alive = Arc::new(AtomicBool::new(true));

        let reader = {
            let pending = pending.clone();
            let alive = alive.clone();
            let server = server.to_string();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stdout);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) => {
                            debug!(server = %server, "server stdout closed");
                            break;
                        }
                        Ok(_) => {
                            let trimmed = line.trim();
                            if trimmed.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                                Ok(resp) => {
                                    if !pending.resolve(resp) {
                                        debug!(server = %server, "dropping unmatched message");
                                    }
                                }
                                Err(e) => {
                                    debug!(server = %server, line = %trimmed, error = %e, "non-JSON-RPC line from server");
                                }
                            }
                        }
                        Err(e) => {
                            warn!(server = %server, error = %e, "error reading server stdout");
                            break;
                        }
                    }
                }
                alive.store(false, Ordering::SeqCst);
                pending.fail_all();
            })
        };

        Ok(Self {
            server: server.to_string(),
            stdin: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
            pending,
            alive,
            reader: parking_lot::Mutex::new(Some(reader)),
        })
    }

    async fn write_line(&self, payload: &str) -> BridgeResult<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(|| {
            BridgeError::SessionClosed(format!("stdin of server '{}' is closed", self.server))
        })?;
        let write = async {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        write.await.map_err(|e| {
            self.alive.store(false, Ordering::SeqCst);
            BridgeError::Connection(format!("failed to write to server '{}': {e}", self.server))
        })
    }

    pub async fn request(
        &self,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> BridgeResult<JsonRpcResponse> {
        if !self.is_alive() {
            return Err(BridgeError::Connection(format!(
                "server '{}' has exited",
                self.server
            )));
        }
        let id = request.id;
        let method = request.method.clone();
        let payload = serde_json::to_string(&request)?;
        let rx = self.pending.register(id);

        await_with_deadline(&self.pending, id, &method, timeout, async {
            self.write_line(&payload).await?;
            rx.await.map_err(|_| {
                BridgeError::Connection(format!(
                    "server '{}' exited before answering '{method}'",
                    self.server
                ))
            })
        })
        .await
    }

    pub async fn notify(&self, notification: JsonRpcNotification) -> BridgeResult<()> {
        let payload = serde_json::to_string(&notification)?;
        self.write_line(&payload).await
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Closes stdin, gives the child a grace period, then kills and reaps it.
    pub async fn close(&self) -> BridgeResult<()> {
        self.alive.store(false, Ordering::SeqCst);
        drop(self.stdin.lock().await.take());

        let child = self.child.lock().await.take();
        let mut outcome = Ok(());
        if let Some(mut child) = child {
            match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
                Ok(Ok(status)) => debug!(server = %self.server, %status, "server exited"),
                Ok(Err(e)) => {
                    outcome = Err(BridgeError::Io(e));
                }
                Err(_) => {
                    debug!(server = %self.server, "server ignored EOF, killing");
                    if let Err(e) = child.start_kill() {
                        // InvalidInput means the child already exited.
                        if e.kind() != std::io::ErrorKind::InvalidInput {
                            outcome = Err(BridgeError::Io(e));
                        }
                    }
                    if let Err(e) = child.wait().await {
                        outcome = Err(BridgeError::Io(e));
                    }
                }
            }
        }

        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.pending.fail_all();
        outcome
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}
