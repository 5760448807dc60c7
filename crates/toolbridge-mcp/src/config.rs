use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which wire mechanism a server is reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON-RPC on stdin/stdout.
    Stdio,
    /// Long-lived event stream plus side-channel POSTs.
    Sse,
    /// One POST round trip per message.
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::Http => "http",
        })
    }
}

/// Configuration for a single tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Label used in logs, status output and collision reports.
    pub name: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
}

/// Transport-specific connection parameters, tagged by `transport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum TransportConfig {
    Stdio(StdioParams),
    Sse(HttpParams),
    Http(HttpParams),
}

/// Parameters for a subprocess server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child. Inherited when unset.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Deadline for spawn plus handshake (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-call deadline (default: 30000).
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

/// Parameters for SSE and plain HTTP servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpParams {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Sent as `Authorization: Bearer <token>` on every request.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Deadline for establishing the connection and handshake (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-call deadline, independent of the connect deadline (default: 30000).
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_call_timeout_ms() -> u64 {
    30_000
}

impl StdioParams {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
            cwd: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl HttpParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            bearer_token: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// A subprocess server.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Stdio(StdioParams::new(command, args)),
        }
    }

    /// An SSE server.
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Sse(HttpParams::new(url)),
        }
    }

    /// A plain HTTP server.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportConfig::Http(HttpParams::new(url)),
        }
    }

    /// The reference filesystem server, restricted to `paths`.
    pub fn filesystem<P: Into<String>>(paths: impl IntoIterator<Item = P>) -> Self {
        let mut args = vec![
            "-y".to_string(),
            "@modelcontextprotocol/server-filesystem".to_string(),
        ];
        args.extend(paths.into_iter().map(Into::into));
        Self::stdio("filesystem", "npx", args)
    }

    pub fn kind(&self) -> TransportKind {
        match self.transport {
            TransportConfig::Stdio(_) => TransportKind::Stdio,
            TransportConfig::Sse(_) => TransportKind::Sse,
            TransportConfig::Http(_) => TransportKind::Http,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(match &self.transport {
            TransportConfig::Stdio(p) => p.connect_timeout_ms,
            TransportConfig::Sse(p) | TransportConfig::Http(p) => p.connect_timeout_ms,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(match &self.transport {
            TransportConfig::Stdio(p) => p.call_timeout_ms,
            TransportConfig::Sse(p) | TransportConfig::Http(p) => p.call_timeout_ms,
        })
    }

    /// Overrides the per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        match &mut self.transport {
            TransportConfig::Stdio(p) => p.call_timeout_ms = ms,
            TransportConfig::Sse(p) | TransportConfig::Http(p) => p.call_timeout_ms = ms,
        }
        self
    }
}

/// Where local tools sit relative to remote ones in the aggregate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalToolPlacement {
    /// Local tools first.
    Prepend,
    /// Local tools last.
    #[default]
    Append,
    /// Local tools are not exposed.
    Disabled,
}

/// Everything needed to build a registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub local_tools: LocalToolPlacement,
}
