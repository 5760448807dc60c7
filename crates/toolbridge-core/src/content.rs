use crate::error::{BridgeError, ErrorKind};
use serde::{Deserialize, Serialize};

/// One block of tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Human-readable text.
    Text {
        /// The text payload.
        text: String,
    },
    /// Any non-text payload (images, resources, structured JSON), kept as
    /// the raw JSON the producer emitted.
    Structured {
        /// The structured payload.
        value: serde_json::Value,
    },
}

impl ContentBlock {
    /// Creates a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Creates a structured block.
    pub fn structured(value: serde_json::Value) -> Self {
        ContentBlock::Structured { value }
    }

    /// The text payload, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Structured { .. } => None,
        }
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationError {
    /// Taxonomy tag.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Normalized outcome of one tool invocation.
///
/// Exactly one of `content` (on success) or `error` (on failure) is
/// populated. Use the constructors rather than building the struct by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Whether the tool ran successfully.
    pub success: bool,
    /// Output blocks, in producer order. Empty on failure.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Failure description. `None` on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
}

impl InvocationResult {
    /// Creates a successful result from a block sequence.
    ///
    /// An empty sequence is normalized to a single empty text block so the
    /// result never carries neither content nor error.
    pub fn success(content: Vec<ContentBlock>) -> Self {
        let content = if content.is_empty() {
            vec![ContentBlock::text("")]
        } else {
            content
        };
        Self {
            success: true,
            content,
            error: None,
        }
    }

    /// Creates a successful result holding a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::success(vec![ContentBlock::text(text)])
    }

    /// Creates a failed result.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: Vec::new(),
            error: Some(InvocationError {
                kind,
                message: message.into(),
            }),
        }
    }

    /// Creates a failed result from a [`BridgeError`], keeping its kind.
    pub fn from_error(err: &BridgeError) -> Self {
        Self::failure(err.kind(), err.description())
    }

    /// The error kind, if this result is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// All text blocks joined with newlines. Structured blocks are skipped.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The plain string handed to simple callers: the joined text on
    /// success, `"Error: <description>"` on failure.
    pub fn to_display_string(&self) -> String {
        match &self.error {
            Some(err) => format!("Error: {}", err.message),
            None => self.joined_text(),
        }
    }
}
