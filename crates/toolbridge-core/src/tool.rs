use crate::content::InvocationResult;
use serde::{Deserialize, Serialize};

/// A request from the reasoning engine to invoke a specific tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier assigned by the engine for this tool call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// The string-only result returned to the engine for a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The ID of the [`ToolCall`] this result corresponds to.
    pub call_id: String,
    /// The textual output, or `"Error: <description>"`.
    pub content: String,
    /// Whether the tool execution ended in an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Flattens an [`InvocationResult`] into its display string.
    pub fn from_invocation(call_id: impl Into<String>, result: &InvocationResult) -> Self {
        Self {
            call_id: call_id.into(),
            content: result.to_display_string(),
            is_error: !result.success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_from_invocation_success() {
        let result = ToolResult::from_invocation("call_1", &InvocationResult::text("42"));
        assert!(!result.is_error);
        assert_eq!(result.content, "42");
    }

    #[test]
    fn test_from_invocation_failure() {
        let failed = InvocationResult::failure(ErrorKind::RemoteTool, "boom");
        let result = ToolResult::from_invocation("call_2", &failed);
        assert!(result.is_error);
        assert_eq!(result.content, "Error: boom");
        assert_eq!(result.call_id, "call_2");
    }
}
