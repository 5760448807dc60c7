//! The uniform tool contract shared by remote and local tools.
//!
//! A [`ToolDescriptor`] is the normalized declaration of a tool: name,
//! description and a typed [`ParameterSchema`]. A [`ToolAdapter`] binds a
//! descriptor to something that can execute it. Local tools come from a
//! [`LocalToolProvider`] and never touch a transport.

/// The adapter trait.
pub mod adapter;
/// Descriptors and parameter schemas.
pub mod descriptor;
/// Local tool sources.
pub mod provider;

pub use adapter::{arguments_from_value, ToolAdapter};
pub use descriptor::{ParamType, ParameterSchema, ParameterSpec, ToolDescriptor};
pub use provider::LocalToolProvider;
