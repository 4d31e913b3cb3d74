//! Service settings.
//!
//! Loaded from a YAML file with `${VAR}` / `${VAR:-default}` interpolation
//! applied to the raw text before parsing. Every section has defaults, so an
//! empty file (or no file at all) yields a runnable configuration pointing at
//! the two local tool servers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::ModelConfig;
use crate::mcp_client::{ClientOptions, CollisionPolicy, ServerConfig};
use crate::resilience::CircuitBreakerConfig;

/// Env var naming the settings file when no CLI argument is given.
pub const CONFIG_ENV_VAR: &str = "TOOLMESH_CONFIG";

// ─── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Sections ───────────────────────────────────────────────────────────────

/// Admission control and breaker thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Requests admitted per identity per window.
    pub rate_limit: u32,
    pub rate_window_secs: u64,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_timeout_secs: u64,
    /// Also guard the reasoning model with a breaker.
    pub model_circuit_breaker: bool,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            rate_limit: 60,
            rate_window_secs: 60,
            circuit_failure_threshold: 5,
            circuit_reset_timeout_secs: 30,
            model_circuit_breaker: true,
        }
    }
}

impl ResilienceSettings {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            reset_timeout: Duration::from_secs(self.circuit_reset_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    pub max_turns: usize,
    pub collision_policy: CollisionPolicy,
    /// Per tool call.
    pub call_timeout_secs: u64,
    /// Per inbound request, covering the whole run.
    pub request_timeout_secs: u64,
    /// Replaces the built-in system instructions.
    pub system_prompt: Option<String>,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            max_turns: crate::agent_core::DEFAULT_MAX_TURNS,
            collision_policy: CollisionPolicy::default(),
            call_timeout_secs: 30,
            request_timeout_secs: 120,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

// ─── Settings ───────────────────────────────────────────────────────────────

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub servers: Vec<ServerConfig>,
    pub model: ModelConfig,
    pub resilience: ResilienceSettings,
    pub orchestration: OrchestrationSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            model: ModelConfig::default(),
            resilience: ResilienceSettings::default(),
            orchestration: OrchestrationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            name: "url-fetcher".into(),
            url: "http://localhost:8001/mcp".into(),
        },
        ServerConfig {
            name: "random-web".into(),
            url: "http://localhost:8003/mcp".into(),
        },
    ]
}

impl Settings {
    /// Load, interpolate and validate a settings file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let settings = Self::from_yaml_str(&raw)?;
        tracing::info!(path = %path.display(), servers = settings.servers.len(), "loaded settings");
        Ok(settings)
    }

    /// Parse settings from YAML text, interpolating env vars first.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let interpolated = interpolate_env_vars(raw);
        let settings: Settings = if interpolated.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
                reason: e.to_string(),
            })?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Resolve the settings for this process.
    ///
    /// Order: explicit path (CLI argument), then [`CONFIG_ENV_VAR`], then
    /// built-in defaults.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = cli_path {
            return Self::load(path);
        }
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(&path)),
            _ => {
                tracing::info!("no settings file given, using defaults");
                let settings = Self::default();
                settings.validate()?;
                Ok(settings)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_string(),
            })
        };

        let r = &self.resilience;
        if r.rate_limit == 0 {
            return invalid("resilience.rate_limit must be greater than zero");
        }
        if r.rate_window_secs == 0 {
            return invalid("resilience.rate_window_secs must be greater than zero");
        }
        if r.circuit_failure_threshold == 0 {
            return invalid("resilience.circuit_failure_threshold must be greater than zero");
        }
        if r.circuit_reset_timeout_secs == 0 {
            return invalid("resilience.circuit_reset_timeout_secs must be greater than zero");
        }

        let o = &self.orchestration;
        if o.max_turns == 0 {
            return invalid("orchestration.max_turns must be greater than zero");
        }
        if o.call_timeout_secs == 0 || o.request_timeout_secs == 0 {
            return invalid("orchestration timeouts must be greater than zero");
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.name.trim().is_empty() {
                return invalid("server name must not be empty");
            }
            if server.url.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("server '{}' has an empty url", server.name),
                });
            }
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate server name '{}'", server.name),
                });
            }
        }

        self.model.validate().map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            collision_policy: self.orchestration.collision_policy,
            breaker: self.resilience.breaker(),
            call_timeout: Duration::from_secs(self.orchestration.call_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestration.request_timeout_secs)
    }
}

// ─── Interpolation ──────────────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` with environment values.
///
/// An unset variable without a default becomes the empty string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next(); // '{'
        let expr: String = chars.by_ref().take_while(|&c| c != '}').collect();
        result.push_str(&resolve_var_expr(&expr));
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| default.to_string()),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
