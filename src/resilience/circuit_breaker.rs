//! Circuit breaker for calls to an unreliable dependency.
//!
//! State machine:
//! - `Closed` → `Open` once `failure_count` reaches the threshold
//! - `Open` → `HalfOpen` on the first call attempt after the cooldown elapses
//! - `HalfOpen` → `Closed` (counter reset) on success, back to `Open` on failure
//!
//! The cooldown is fixed: no jitter, no exponential growth. State lives
//! behind a `std::sync::Mutex` that is never held across an `.await`, so the
//! wrapped operation itself runs unlocked and concurrent callers observe a
//! consistent state.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::errors::CircuitOpenError;

// ─── Configuration ──────────────────────────────────────────────────────────

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures needed to open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is allowed.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the cooldown elapses.
    Open,
    /// The cooldown elapsed; the next outcome decides the state.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    open_until: Option<Instant>,
}

// ─── CircuitBreaker ─────────────────────────────────────────────────────────

/// Fault-isolation wrapper shared by every caller of one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker. `name` identifies the protected dependency in
    /// logs and errors.
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                open_until: None,
            }),
        }
    }

    /// The protected dependency's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state (does not advance `Open` → `HalfOpen`).
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Failures recorded since the circuit last closed.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Run `operation` unless the circuit is open.
    ///
    /// The operation's own error type must be able to carry a
    /// [`CircuitOpenError`] so fast-fail rejections flow through the same
    /// `Result` as ordinary failures.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError> + std::fmt::Display,
    {
        self.before_call()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure(&e);
                Err(e)
            }
        }
    }

    /// Reject while the cooldown runs; flip to `HalfOpen` once it has elapsed.
    fn before_call(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let now = Instant::now();
        match inner.open_until {
            Some(deadline) if now < deadline => {
                tracing::warn!(breaker = %self.name, "circuit open, failing fast");
                Err(CircuitOpenError {
                    name: self.name.clone(),
                    retry_after: deadline - now,
                })
            }
            _ => {
                tracing::info!(breaker = %self.name, "circuit transitioning open -> half-open");
                inner.state = CircuitState::HalfOpen;
                Ok(())
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            tracing::info!(breaker = %self.name, "circuit transitioning half-open -> closed");
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            inner.open_until = None;
        }
    }

    fn on_failure(&self, error: &dyn std::fmt::Display) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        tracing::warn!(
            breaker = %self.name,
            failures = inner.failure_count,
            threshold = self.config.failure_threshold,
            error = %error,
            "circuit recorded failure"
        );

        let should_open = match inner.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => inner.failure_count >= self.config.failure_threshold,
            // A call admitted before the circuit opened; the cooldown stands.
            CircuitState::Open => false,
        };

        if should_open {
            tracing::warn!(
                breaker = %self.name,
                cooldown_secs = self.config.reset_timeout.as_secs_f64(),
                "circuit opened"
            );
            inner.state = CircuitState::Open;
            inner.open_until = Some(Instant::now() + self.config.reset_timeout);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        // The guarded section never panics, so a poisoned lock still holds
        // consistent state.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
