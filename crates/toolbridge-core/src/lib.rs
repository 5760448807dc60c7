//! Core types and error definitions for the toolbridge adapter layer.
//!
//! This crate provides the foundational types shared across all toolbridge
//! crates: the error taxonomy, typed content blocks, the uniform
//! [`InvocationResult`] every tool returns, and the engine-facing
//! [`ToolCall`] / [`ToolResult`] pair.
//!
//! # Main types
//!
//! - [`BridgeError`]: Unified error enum covering connection, timeout,
//!   protocol, validation and remote-tool failures.
//! - [`BridgeResult`]: Convenience alias for `Result<T, BridgeError>`.
//! - [`ErrorKind`]: Serialisable tag for the error taxonomy.
//! - [`ContentBlock`]: A single text or structured result block.
//! - [`InvocationResult`]: Normalized outcome of one tool invocation.
//! - [`ToolCall`] / [`ToolResult`]: String-only request/response pair for
//!   reasoning engines.

/// Typed content blocks and invocation results.
pub mod content;
/// Error taxonomy.
pub mod error;
/// Engine-facing tool call types.
pub mod tool;

pub use content::{ContentBlock, InvocationError, InvocationResult};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use tool::{ToolCall, ToolResult};

/// Keyword arguments passed to a tool: parameter name to JSON value.
pub type Arguments = serde_json::Map<String, serde_json::Value>;
