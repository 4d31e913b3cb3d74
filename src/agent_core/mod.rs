//! Agent Core: orchestration layer for toolmesh.
//!
//! Submodules:
//! - `conversation`: Per-run model history and transcript
//! - `tool_router`: Dispatches model tool calls to tool servers
//! - `orchestrator`: The bounded multi-turn model ↔ tool loop
//! - `types`: Transcript entries returned to callers
//! - `errors`: Agent-level error types

pub mod conversation;
pub mod errors;
pub mod orchestrator;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use conversation::ConversationState;
pub use errors::AgentError;
pub use orchestrator::{OrchestrationEngine, DEFAULT_MAX_TURNS, DEFAULT_SYSTEM_PROMPT, NO_TOOLS_MESSAGE};
pub use tool_router::{PendingCall, ToolOutcome, ToolRouter};
pub use types::{EntryBody, TranscriptEntry, TranscriptRole};
