use crate::adapter::ToolAdapter;
use std::sync::Arc;

/// Source of built-in adapters that bypass the transport layer.
pub trait LocalToolProvider: Send + Sync {
    /// The adapters this provider supplies, in a stable order.
    fn tools(&self) -> Vec<Arc<dyn ToolAdapter>>;
}
