//! Local tools that run in-process and never touch a transport.
//!
//! - [`CalculatorTool`] evaluates a restricted arithmetic grammar.
//! - [`FinalAnswerTool`] echoes its answer and marks the task complete.
//!
//! [`BuiltinTools`] hands both to a registry as a [`LocalToolProvider`].

/// Restricted arithmetic evaluator and the calculator tool.
pub mod calculator;
/// Terminal final-answer tool.
pub mod final_answer;

pub use calculator::{evaluate, format_number, CalculatorTool};
pub use final_answer::FinalAnswerTool;

use std::sync::Arc;
use toolbridge_tools::{LocalToolProvider, ToolAdapter};

/// The standard local toolset: calculator, then final answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinTools;

impl LocalToolProvider for BuiltinTools {
    fn tools(&self) -> Vec<Arc<dyn ToolAdapter>> {
        vec![
            Arc::new(CalculatorTool::new()),
            Arc::new(FinalAnswerTool::new()),
        ]
    }
}
