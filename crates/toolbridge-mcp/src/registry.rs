//! The client registry: every server session plus the flat list of tool
//! adapters handed to the reasoning engine.

use crate::adapter::RemoteToolAdapter;
use crate::config::{LocalToolPlacement, ServerConfig, TransportKind};
use crate::session::{SessionState, TransportSession};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use toolbridge_core::{
    Arguments, BridgeError, BridgeResult, InvocationResult, ToolCall, ToolResult,
};
use toolbridge_tools::{arguments_from_value, LocalToolProvider, ToolAdapter};
use tracing::{info, warn};

/// Status of one registered server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    /// Server name from its config.
    pub name: String,
    /// Wire transport in use.
    pub transport: TransportKind,
    /// Current session state.
    pub state: SessionState,
    /// Number of adapters registered for this server.
    pub tool_count: usize,
    /// When the handshake completed.
    pub connected_at: Option<DateTime<Utc>>,
}

/// Outcome of [`ClientRegistry::close`].
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Servers whose session closed cleanly.
    pub closed: Vec<String>,
    /// Servers whose close reported an error. Every session was still attempted.
    pub failures: Vec<(String, BridgeError)>,
}

impl CloseReport {
    /// True when no session reported a close error.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct ManagedServer {
    session: Arc<TransportSession>,
    adapters: Vec<Arc<dyn ToolAdapter>>,
}

#[derive(Default)]
struct RegistryState {
    servers: Vec<ManagedServer>,
    closed: bool,
}

/// A connected server whose adapters are built but not yet registered.
struct PreparedServer {
    session: Arc<TransportSession>,
    adapters: Vec<Arc<dyn ToolAdapter>>,
}

/// Owns every session and exposes the flat adapter list.
///
/// The lock guards registration only. Adapters are cloned out before use,
/// so invocations run unlocked and concurrently.
pub struct ClientRegistry {
    state: RwLock<RegistryState>,
    local_tools: Vec<Arc<dyn ToolAdapter>>,
    placement: LocalToolPlacement,
}

impl ClientRegistry {
    /// An empty registry without local tools.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            local_tools: Vec::new(),
            placement: LocalToolPlacement::Disabled,
        }
    }

    /// A registry exposing `provider`'s tools alongside remote ones.
    ///
    /// Local tools count as registered before any server, so a remote tool
    /// with the same name is rejected.
    pub fn with_local_tools(provider: &dyn LocalToolProvider, placement: LocalToolPlacement) -> Self {
        let mut seen = HashSet::new();
        let local_tools = provider
            .tools()
            .into_iter()
            .filter(|tool| {
                let fresh = seen.insert(tool.name().to_string());
                if !fresh {
                    warn!(tool = %tool.name(), "duplicate local tool ignored");
                }
                fresh
            })
            .collect();
        Self {
            state: RwLock::new(RegistryState::default()),
            local_tools,
            placement,
        }
    }

    /// Connects a server, discovers its tools and registers one adapter per
    /// tool. Returns the number of tools registered.
    ///
    /// All or nothing: on any failure, including a name collision, none of
    /// the server's tools are registered, its session is closed and the
    /// servers registered earlier are untouched.
    pub async fn add_server(&self, config: ServerConfig) -> BridgeResult<usize> {
        self.ensure_open()?;
        let name = config.name.clone();
        let prepared = match Self::prepare(config).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(server = %name, error = %e, "server not registered");
                return Err(e);
            }
        };
        self.commit(prepared).await
    }

    /// Connects several servers concurrently, then registers them in the
    /// order given. One failure never affects the others.
    pub async fn connect_all(&self, configs: &[ServerConfig]) -> Vec<BridgeError> {
        if let Err(e) = self.ensure_open() {
            return vec![e];
        }
        let prepared =
            futures_util::future::join_all(configs.iter().cloned().map(Self::prepare)).await;

        let mut errors = Vec::new();
        for (config, outcome) in configs.iter().zip(prepared) {
            let result = match outcome {
                Ok(prepared) => self.commit(prepared).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(server = %config.name, error = %e, "server not registered");
                errors.push(e);
            }
        }
        errors
    }

    async fn prepare(config: ServerConfig) -> BridgeResult<PreparedServer> {
        let session = Arc::new(TransportSession::new(config));
        session.connect().await?;
        let descriptors = match session.discover().await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!(
                        server = %session.name(),
                        error = %close_err,
                        "failed to close server after discovery error"
                    );
                }
                return Err(e);
            }
        };
        let adapters = descriptors
            .into_iter()
            .map(|d| Arc::new(RemoteToolAdapter::new(d, &session)) as Arc<dyn ToolAdapter>)
            .collect();
        Ok(PreparedServer { session, adapters })
    }

    async fn commit(&self, prepared: PreparedServer) -> BridgeResult<usize> {
        let name = prepared.session.name().to_string();
        let session = prepared.session.clone();
        match self.try_register(prepared) {
            Ok(count) => {
                info!(server = %name, tools = count, "server registered");
                Ok(count)
            }
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!(server = %name, error = %close_err, "failed to close rejected server");
                }
                Err(e)
            }
        }
    }

    fn try_register(&self, prepared: PreparedServer) -> BridgeResult<usize> {
        let mut state = self.state.write();
        if state.closed {
            return Err(BridgeError::SessionClosed("registry is closed".into()));
        }
        let server = prepared.session.name();
        if state.servers.iter().any(|s| s.session.name() == server) {
            return Err(BridgeError::Collision(format!(
                "server '{server}' is already registered"
            )));
        }

        let mut taken: HashSet<&str> = state
            .servers
            .iter()
            .flat_map(|s| s.adapters.iter().map(|a| a.name()))
            .collect();
        if self.placement != LocalToolPlacement::Disabled {
            taken.extend(self.local_tools.iter().map(|a| a.name()));
        }
        let clashes: Vec<&str> = prepared
            .adapters
            .iter()
            .map(|a| a.name())
            .filter(|n| taken.contains(n))
            .collect();
        if !clashes.is_empty() {
            return Err(BridgeError::Collision(format!(
                "server '{server}' declares already registered tool(s): {}",
                clashes.join(", ")
            )));
        }

        let count = prepared.adapters.len();
        drop(taken);
        state.servers.push(ManagedServer {
            session: prepared.session,
            adapters: prepared.adapters,
        });
        Ok(count)
    }

    fn ensure_open(&self) -> BridgeResult<()> {
        if self.state.read().closed {
            Err(BridgeError::SessionClosed("registry is closed".into()))
        } else {
            Ok(())
        }
    }

    /// Every adapter: servers in registration order, tools in discovery
    /// order, local tools placed per configuration.
    pub fn get_tools(&self) -> Vec<Arc<dyn ToolAdapter>> {
        let remote: Vec<Arc<dyn ToolAdapter>> = self
            .state
            .read()
            .servers
            .iter()
            .flat_map(|s| s.adapters.iter().cloned())
            .collect();
        match self.placement {
            LocalToolPlacement::Disabled => remote,
            LocalToolPlacement::Append => {
                let mut tools = remote;
                tools.extend(self.local_tools.iter().cloned());
                tools
            }
            LocalToolPlacement::Prepend => {
                let mut tools = self.local_tools.clone();
                tools.extend(remote);
                tools
            }
        }
    }

    /// The adapter named `name`, local or remote.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.get_tools().into_iter().find(|t| t.name() == name)
    }

    /// Invokes a tool by name.
    pub async fn invoke(&self, name: &str, args: Arguments) -> BridgeResult<InvocationResult> {
        let tool = self
            .get_tool(name)
            .ok_or_else(|| BridgeError::UnknownTool(name.to_string()))?;
        tool.invoke(args).await
    }

    /// String-only path for engines that speak [`ToolCall`]/[`ToolResult`].
    /// Every failure, hard or soft, becomes an error result.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResult {
        let outcome = match arguments_from_value(call.arguments) {
            Ok(args) => self.invoke(&call.name, args).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(result) => ToolResult::from_invocation(&call.id, &result),
            Err(e) => ToolResult::from_invocation(&call.id, &InvocationResult::from_error(&e)),
        }
    }

    /// Function specs for every adapter, in [`get_tools`](Self::get_tools) order.
    pub fn function_specs(&self) -> Vec<serde_json::Value> {
        self.get_tools()
            .iter()
            .map(|t| t.descriptor().to_function_spec())
            .collect()
    }

    /// One entry per registered server, in registration order.
    pub fn status(&self) -> Vec<ServerStatus> {
        self.state
            .read()
            .servers
            .iter()
            .map(|s| ServerStatus {
                name: s.session.name().to_string(),
                transport: s.session.kind(),
                state: s.session.state(),
                tool_count: s.adapters.len(),
                connected_at: s.session.connected_at(),
            })
            .collect()
    }

    /// Number of registered servers.
    pub fn server_count(&self) -> usize {
        self.state.read().servers.len()
    }

    /// True once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Closes every session exactly once. Failures are collected, not raised.
    /// Calling it again returns an empty report.
    pub async fn close(&self) -> CloseReport {
        let servers = {
            let mut state = self.state.write();
            state.closed = true;
            std::mem::take(&mut state.servers)
        };

        let mut report = CloseReport::default();
        for server in servers {
            let name = server.session.name().to_string();
            match server.session.close().await {
                Ok(()) => report.closed.push(name),
                Err(e) => {
                    warn!(server = %name, error = %e, "failed to close session");
                    report.failures.push((name, e));
                }
            }
        }
        if !report.closed.is_empty() || !report.failures.is_empty() {
            info!(
                closed = report.closed.len(),
                failed = report.failures.len(),
                "registry closed"
            );
        }
        report
    }

    /// Same as [`close`](Self::close).
    pub async fn close_all(&self) -> CloseReport {
        self.close().await
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolbridge_core::ErrorKind;
    use toolbridge_tools::{ParameterSchema, ToolDescriptor};

    struct Fixed(ToolDescriptor);

    #[async_trait]
    impl ToolAdapter for Fixed {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.0
        }
        async fn invoke(&self, _args: Arguments) -> BridgeResult<InvocationResult> {
            Ok(InvocationResult::text(format!("ran {}", self.0.name)))
        }
    }

    struct Provider(Vec<&'static str>);

    impl LocalToolProvider for Provider {
        fn tools(&self) -> Vec<Arc<dyn ToolAdapter>> {
            self.0
                .iter()
                .map(|n| {
                    Arc::new(Fixed(ToolDescriptor::new(*n, "", ParameterSchema::empty())))
                        as Arc<dyn ToolAdapter>
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.server_count(), 0);
        assert!(registry.get_tools().is_empty());
        assert!(registry.status().is_empty());
    }

    #[tokio::test]
    async fn test_local_tools_and_dispatch() {
        let registry = ClientRegistry::with_local_tools(
            &Provider(vec!["calculator", "final_answer", "calculator"]),
            LocalToolPlacement::Append,
        );
        let names: Vec<String> = registry.get_tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["calculator", "final_answer"]);

        let result = registry
            .dispatch(ToolCall {
                id: "c1".into(),
                name: "final_answer".into(),
                arguments: serde_json::json!({}),
            })
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "ran final_answer");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ClientRegistry::new();
        let err = registry.invoke("nope", Arguments::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let result = registry
            .dispatch(ToolCall {
                id: "c2".into(),
                name: "nope".into(),
                arguments: serde_json::json!([1, 2]),
            })
            .await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_disabled_local_tools_are_hidden() {
        let registry =
            ClientRegistry::with_local_tools(&Provider(vec!["calculator"]), LocalToolPlacement::Disabled);
        assert!(registry.get_tool("calculator").is_none());
        assert!(registry.function_specs().is_empty());
    }

    #[tokio::test]
    async fn test_failed_server_is_absent() {
        let registry = ClientRegistry::new();
        let errors = registry
            .connect_all(&[ServerConfig::stdio(
                "ghost",
                "/nonexistent/toolbridge-server",
                vec![],
            )])
            .await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), ErrorKind::Connection);
        assert_eq!(registry.server_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_registry_rejects_servers() {
        let registry = ClientRegistry::new();
        assert!(registry.close().await.is_clean());
        assert!(registry.is_closed());
        let err = registry
            .add_server(ServerConfig::http("late", "http://127.0.0.1:1/mcp"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionClosed);
    }
}
