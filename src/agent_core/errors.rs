//! Agent Core error types.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::mcp_client::McpError;
use crate::resilience::CircuitOpenError;

/// Errors that end an orchestration run.
///
/// Tool failures the model can react to never appear here; they are folded
/// into the conversation instead.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A circuit breaker (tool server or model) rejected a call.
    #[error(transparent)]
    CircuitOpen(CircuitOpenError),

    /// The reasoning model call failed.
    #[error(transparent)]
    Inference(InferenceError),

    /// Tool infrastructure failed outside of a single invocation.
    #[error("tool infrastructure error: {0}")]
    Tool(McpError),
}

impl AgentError {
    /// The breaker rejection behind this error, if any.
    pub fn circuit_open(&self) -> Option<&CircuitOpenError> {
        match self {
            AgentError::CircuitOpen(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InferenceError> for AgentError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::CircuitOpen(open) => AgentError::CircuitOpen(open),
            other => AgentError::Inference(other),
        }
    }
}

impl From<McpError> for AgentError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::CircuitOpen(open) => AgentError::CircuitOpen(open),
            other => AgentError::Tool(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn open() -> CircuitOpenError {
        CircuitOpenError {
            name: "url-fetcher".into(),
            retry_after: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_circuit_open_unwrapped_from_both_sources() {
        let from_tool = AgentError::from(McpError::CircuitOpen(open()));
        assert!(from_tool.circuit_open().is_some());

        let from_model = AgentError::from(InferenceError::CircuitOpen(open()));
        assert_eq!(from_model.circuit_open().unwrap().name, "url-fetcher");
    }

    #[test]
    fn test_other_errors_are_not_circuit_open() {
        let err = AgentError::from(InferenceError::Timeout { duration_secs: 60 });
        assert!(err.circuit_open().is_none());
        assert_eq!(err.to_string(), "inference timeout after 60s");
    }
}
