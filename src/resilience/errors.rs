//! Resilience error types.

use std::time::Duration;

use thiserror::Error;

/// A call was rejected because the circuit is open.
#[derive(Debug, Clone, Error)]
#[error("circuit breaker '{name}' is open (retry in {}s)", retry_after.as_secs())]
pub struct CircuitOpenError {
    /// The protected dependency.
    pub name: String,
    /// Remaining cooldown at the time of rejection.
    pub retry_after: Duration,
}

/// A caller exceeded its admission budget.
#[derive(Debug, Clone, Error)]
#[error("rate limit exceeded for '{identity}': {limit} requests per {}s", window.as_secs())]
pub struct RateLimitExceeded {
    pub identity: String,
    pub limit: u32,
    pub window: Duration,
}
