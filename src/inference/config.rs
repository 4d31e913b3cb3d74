//! Model endpoint configuration.
//!
//! Loaded as the `model` section of the settings file. Sampling defaults
//! favour short, deterministic answers: the loop mostly asks the model to
//! pick a tool or rephrase a tool result.

use serde::{Deserialize, Serialize};

use super::errors::InferenceError;

/// Runtime configuration for the reasoning model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (e.g. `http://localhost:11434/v1`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Sent as a bearer token when present.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: Option<f32>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model_name() -> String {
    "qwen2.5:7b".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_top_p() -> Option<f32> {
    Some(0.1)
}
fn default_max_tokens() -> u32 {
    300
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model_name: default_model_name(),
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Reject values the endpoint would refuse anyway.
    pub fn validate(&self) -> Result<(), InferenceError> {
        let invalid = |reason: String| Err(InferenceError::ConfigError { reason });

        if self.base_url.trim().is_empty() {
            return invalid("model.base_url must not be empty".into());
        }
        if self.model_name.trim().is_empty() {
            return invalid("model.model_name must not be empty".into());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid(format!(
                "model.temperature must be within 0.0..=2.0, got {}",
                self.temperature
            ));
        }
        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return invalid(format!("model.top_p must be within 0.0..=1.0, got {top_p}"));
            }
        }
        if self.max_tokens == 0 {
            return invalid("model.max_tokens must be positive".into());
        }
        if self.timeout_secs == 0 {
            return invalid("model.timeout_secs must be positive".into());
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
