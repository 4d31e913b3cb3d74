//! Resilience primitives shared by every request one instance serves.
//!
//! - `circuit_breaker`: fail fast on a dependency after repeated failures
//! - `rate_limiter`: sliding-window admission control per caller identity
//! - `errors`: the rejection errors both produce
//!
//! State is process-local. Both types are meant to be owned by the service
//! instance and shared by reference (`Arc`) with request handlers.

pub mod circuit_breaker;
pub mod errors;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use errors::{CircuitOpenError, RateLimitExceeded};
pub use rate_limiter::RateLimiter;
