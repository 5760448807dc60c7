use crate::descriptor::ToolDescriptor;
use async_trait::async_trait;
use toolbridge_core::{Arguments, BridgeError, BridgeResult, InvocationResult};

/// A single callable tool, remote or local.
///
/// `invoke` reports every tool-execution failure (bad arguments, remote
/// exception, timeout, lost transport) as a failed [`InvocationResult`].
/// `Err` is reserved for misuse the caller must fix, such as invoking an
/// adapter whose session has been closed.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The tool's normalized declaration.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Runs the tool with keyword arguments.
    async fn invoke(&self, args: Arguments) -> BridgeResult<InvocationResult>;

    /// The tool's name.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Whether a successful call ends the reasoning engine's task.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Runs the tool and flattens the outcome to a display string.
    async fn invoke_text(&self, args: Arguments) -> String {
        match self.invoke(args).await {
            Ok(result) => result.to_display_string(),
            Err(e) => format!("Error: {}", e.description()),
        }
    }
}

/// Converts engine-supplied JSON into keyword arguments.
///
/// `null` is treated as no arguments; anything other than an object is a
/// validation failure.
pub fn arguments_from_value(value: serde_json::Value) -> BridgeResult<Arguments> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Arguments::new()),
        other => Err(BridgeError::Validation(format!(
            "tool arguments must be a JSON object, got {other}"
        ))),
    }
}
