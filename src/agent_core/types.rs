//! Shared types for the agent core.
//!
//! The transcript is the human-facing record of one run. Entries serialize
//! to flat JSON objects keyed by `role`:
//!
//! ```json
//! {"role": "user", "message": "..."}
//! {"role": "assistant", "tool_use": {"name": "...", "input": {...}}}
//! {"role": "tool", "name": "...", "result": "..."}
//! {"role": "tool", "name": "...", "error": "Error: ..."}
//! {"role": "assistant", "message": "..."}
//! ```

use serde::{Deserialize, Serialize};

/// Speaker of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    User,
    Assistant,
    Tool,
}

/// A tool invocation as requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub input: serde_json::Value,
}

/// Payload of a transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryBody {
    ToolUse { tool_use: ToolInvocation },
    ToolResult { name: String, result: String },
    ToolError { name: String, error: String },
    Message { message: String },
}

/// One line of the human-facing transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    #[serde(flatten)]
    pub body: EntryBody,
}

impl TranscriptEntry {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::User,
            body: EntryBody::Message {
                message: message.into(),
            },
        }
    }

    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Assistant,
            body: EntryBody::Message {
                message: message.into(),
            },
        }
    }

    pub fn tool_use(name: &str, input: serde_json::Value) -> Self {
        Self {
            role: TranscriptRole::Assistant,
            body: EntryBody::ToolUse {
                tool_use: ToolInvocation {
                    name: name.to_string(),
                    input,
                },
            },
        }
    }

    pub fn tool_result(name: &str, result: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Tool,
            body: EntryBody::ToolResult {
                name: name.to_string(),
                result: result.into(),
            },
        }
    }

    pub fn tool_error(name: &str, error: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Tool,
            body: EntryBody::ToolError {
                name: name.to_string(),
                error: error.into(),
            },
        }
    }

    /// The text of a user/assistant message entry.
    pub fn message(&self) -> Option<&str> {
        match &self.body {
            EntryBody::Message { message } => Some(message),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, EntryBody::ToolError { .. })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
