//! Client-side bridge to remote tool servers.
//!
//! A [`ClientRegistry`] opens one [`TransportSession`] per configured server
//! (stdio subprocess, SSE stream or plain HTTP), discovers the server's
//! tools, translates each declaration into a [`ToolDescriptor`] and exposes
//! one [`RemoteToolAdapter`] per tool next to any local tools.
//!
//! ```no_run
//! # async fn demo() -> toolbridge_core::BridgeResult<()> {
//! use toolbridge_mcp::{ClientRegistry, ServerConfig};
//!
//! let registry = ClientRegistry::new();
//! registry
//!     .add_server(ServerConfig::stdio("demo", "toolbridge-example-server", vec![]))
//!     .await?;
//! for tool in registry.get_tools() {
//!     println!("{}: {}", tool.name(), tool.descriptor().description);
//! }
//! registry.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`ToolDescriptor`]: toolbridge_tools::ToolDescriptor

pub mod adapter;
pub mod config;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod translate;
pub mod transport;

pub use adapter::RemoteToolAdapter;
pub use config::{
    HttpParams, LocalToolPlacement, RegistryConfig, ServerConfig, StdioParams, TransportConfig,
    TransportKind,
};
pub use protocol::{ServerInfo, PROTOCOL_VERSION};
pub use registry::{ClientRegistry, CloseReport, ServerStatus};
pub use session::{SessionState, TransportSession};
pub use translate::{translate_all, translate_tool};
pub use transport::Transport;
