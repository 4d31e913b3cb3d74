//! toolmesh: a reasoning model orchestrated across remote tool servers.
//!
//! - `resilience`: circuit breaker and sliding-window rate limiter
//! - `mcp_client`: tool server sessions, registry and routing
//! - `inference`: the reasoning model adapter
//! - `agent_core`: the multi-turn orchestration loop
//! - `gateway`: the inbound boundary (admission, status mapping, lifecycle)
//! - `config`: YAML settings

pub mod agent_core;
pub mod config;
pub mod gateway;
pub mod inference;
pub mod mcp_client;
pub mod resilience;

pub use config::Settings;
pub use gateway::{ChatRequest, GatewayError, GatewayResponse, OrchestratorService};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "toolmesh=info,warn";

/// Initialize the tracing subscriber, writing to stderr.
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]. Calling this more than once
/// is harmless: later calls leave the first subscriber in place.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_ok() {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            "=== toolmesh starting ==="
        );
    }
}
