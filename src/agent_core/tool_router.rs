//! ToolRouter: dispatches model tool calls to tool servers.
//!
//! The bridge between the model's tool requests and the [`McpClient`]:
//! - Calls run strictly in the order the model listed them
//! - Every call is recorded in the transcript, followed by its result or error
//! - Failures the model can react to become error-status result blocks;
//!   a breaker rejection aborts the run instead

use std::sync::Arc;

use crate::inference::types::{ContentBlock, ToolResultStatus};
use crate::mcp_client::{McpClient, McpError};

use super::conversation::ConversationState;
use super::errors::AgentError;
use super::types::TranscriptEntry;

// ─── ToolOutcome ────────────────────────────────────────────────────────────

/// Typed result of executing a single tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Tool executed successfully.
    Success { tool_name: String, text: String },
    /// The owning server reported a failure.
    ToolError { tool_name: String, text: String },
    /// No registered server provides the tool.
    UnknownTool { tool_name: String, text: String },
}

impl ToolOutcome {
    /// The text fed back to the model.
    pub fn model_text(&self) -> &str {
        match self {
            Self::Success { text, .. } | Self::ToolError { text, .. } | Self::UnknownTool { text, .. } => {
                text
            }
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Success { .. })
    }

    /// Transcript line for this outcome.
    pub fn transcript_entry(&self) -> TranscriptEntry {
        match self {
            Self::Success { tool_name, text } => TranscriptEntry::tool_result(tool_name, text.as_str()),
            Self::ToolError { tool_name, text } | Self::UnknownTool { tool_name, text } => {
                TranscriptEntry::tool_error(tool_name, text.as_str())
            }
        }
    }

    /// Result block correlated with the model's request id.
    pub fn into_result_block(self, tool_use_id: &str) -> ContentBlock {
        let status = if self.is_error() {
            ToolResultStatus::Error
        } else {
            ToolResultStatus::Success
        };
        let content = match self {
            Self::Success { text, .. } | Self::ToolError { text, .. } | Self::UnknownTool { text, .. } => text,
        };
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content,
            status,
        }
    }
}

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// A tool request extracted from one model output.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

pub struct ToolRouter {
    client: Arc<McpClient>,
}

impl ToolRouter {
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }

    /// Record, execute and record the outcome of one call.
    pub async fn dispatch(
        &self,
        call: &PendingCall,
        conversation: &mut ConversationState,
    ) -> Result<ContentBlock, AgentError> {
        conversation.record(TranscriptEntry::tool_use(&call.name, call.input.clone()));
        let outcome = self.execute(&call.name, call.input.clone()).await?;
        conversation.record(outcome.transcript_entry());
        Ok(outcome.into_result_block(&call.id))
    }

    /// Execute one tool call.
    ///
    /// Only non-conversational failures (an open circuit) are returned as
    /// `Err`; everything else becomes an error outcome.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutcome, AgentError> {
        tracing::info!(tool = %name, input = %arguments, "calling tool");

        match self.client.call_tool(name, arguments).await {
            Ok(output) => Ok(ToolOutcome::Success {
                tool_name: name.to_string(),
                text: output.to_text(),
            }),
            Err(McpError::UnknownTool { .. }) => {
                tracing::error!(tool = %name, "no server found for tool");
                Ok(ToolOutcome::UnknownTool {
                    tool_name: name.to_string(),
                    text: format!("Error: Tool {name} not available"),
                })
            }
            Err(e) if e.is_conversational() => {
                tracing::error!(tool = %name, error = %e, "tool call failed");
                Ok(ToolOutcome::ToolError {
                    tool_name: name.to_string(),
                    text: format!("Error: {e}"),
                })
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call rejected");
                Err(e.into())
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
