//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use thiserror::Error;

use crate::resilience::CircuitOpenError;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The response body could not be interpreted.
    #[error("malformed model response: {reason}")]
    MalformedResponse {
        reason: String,
    },

    /// Configuration validation error.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },

    /// The model's circuit breaker rejected the call.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_circuit_open_is_transparent() {
        let err: InferenceError = CircuitOpenError {
            name: "model".into(),
            retry_after: Duration::from_secs(12),
        }
        .into();
        assert_eq!(err.to_string(), "circuit breaker 'model' is open (retry in 12s)");
    }
}
