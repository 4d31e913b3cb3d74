//! MCP Client error types.

use thiserror::Error;

use crate::resilience::CircuitOpenError;

use super::session::SessionState;

/// Errors that can occur during tool-server operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// The transport to a server could not be established or was lost.
    #[error("failed to connect to server '{server}': {reason}")]
    ConnectionFailed {
        server: String,
        reason: String,
    },

    /// A message could not be written to or read from the transport.
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// A handshake, catalog, or invocation response was malformed.
    #[error("protocol error from server '{server}': {reason}")]
    ProtocolError {
        server: String,
        reason: String,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The session is not in the state the operation requires.
    #[error("server '{server}' not initialized (state: {state:?})")]
    NotInitialized {
        server: String,
        state: SessionState,
    },

    /// Tool not found in the aggregated registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// The remote tool call failed.
    #[error("tool '{tool}' failed on server '{server}': {reason}")]
    ToolExecution {
        tool: String,
        server: String,
        reason: String,
    },

    /// Two servers expose the same tool name under the reject policy.
    #[error("tool '{name}' from server '{incoming}' collides with server '{existing}'")]
    ToolCollision {
        name: String,
        existing: String,
        incoming: String,
    },

    /// The server's circuit breaker rejected the call.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl McpError {
    /// Whether this error belongs in the conversation (the model can react to
    /// it) rather than at the request boundary.
    pub fn is_conversational(&self) -> bool {
        !matches!(self, McpError::CircuitOpen(_))
    }
}
