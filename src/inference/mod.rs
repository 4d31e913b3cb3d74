//! Inference Client: the reasoning-model boundary.
//!
//! This module handles all communication with the model endpoint:
//! - The [`ReasoningModel`] trait the orchestration loop calls
//! - Provider-neutral conversation types (messages, content blocks, stop reasons)
//! - An OpenAI Chat Completions implementation ([`InferenceClient`])
//! - Model configuration
//!
//! Any OpenAI-compatible server works; switching models is a config change,
//! not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{InferenceClient, ReasoningModel};
pub use config::ModelConfig;
pub use errors::InferenceError;
pub use types::{ContentBlock, Message, ModelResponse, Role, StopReason, ToolResultStatus};
