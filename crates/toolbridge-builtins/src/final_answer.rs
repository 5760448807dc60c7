use async_trait::async_trait;
use serde_json::Value;
use toolbridge_core::{Arguments, BridgeResult, InvocationResult};
use toolbridge_tools::{ParamType, ParameterSchema, ToolAdapter, ToolDescriptor};

/// Terminal tool: echoes its answer back and tells the reasoning engine the
/// task is complete.
pub struct FinalAnswerTool {
    descriptor: ToolDescriptor,
}

impl FinalAnswerTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "final_answer",
                "Provide the final answer to the user's request and finish the task",
                ParameterSchema::empty().with_param(
                    "answer",
                    ParamType::String,
                    "The final answer",
                    true,
                ),
            ),
        }
    }
}

impl Default for FinalAnswerTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for FinalAnswerTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: Arguments) -> BridgeResult<InvocationResult> {
        if let Err(e) = self.descriptor.parameters.validate(&args) {
            return Ok(InvocationResult::from_error(&e));
        }
        let answer = match args.get("answer") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Ok(InvocationResult::text(answer))
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use toolbridge_core::ErrorKind;

    #[tokio::test]
    async fn test_echoes_answer() {
        let tool = FinalAnswerTool::new();
        let mut args = Arguments::new();
        args.insert("answer".into(), Value::String("42 apples".into()));
        assert_eq!(tool.invoke_text(args).await, "42 apples");
        assert!(tool.is_terminal());
    }

    #[tokio::test]
    async fn test_non_string_answer_is_serialized() {
        let tool = FinalAnswerTool::new();
        let mut args = Arguments::new();
        args.insert("answer".into(), serde_json::json!({"total": 3}));
        assert_eq!(tool.invoke_text(args).await, r#"{"total":3}"#);
    }

    #[tokio::test]
    async fn test_missing_answer() {
        let result = FinalAnswerTool::new().invoke(Arguments::new()).await.unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
    }
}
