//! OrchestratorService: the inbound boundary.
//!
//! Every request passes admission control first, then runs one orchestration
//! under a request-level timeout. Outcomes map onto a small status
//! vocabulary:
//!
//! | status | meaning                                   |
//! |--------|-------------------------------------------|
//! | 202    | processed, body carries the transcript    |
//! | 400    | empty message                             |
//! | 429    | rate limit exceeded                       |
//! | 500    | internal failure or request timeout       |
//! | 503    | a circuit breaker rejected the run, or    |
//! |        | the service is stopped                    |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::agent_core::OrchestrationEngine;
use crate::config::Settings;
use crate::inference::{InferenceClient, InferenceError, ReasoningModel};
use crate::mcp_client::{BreakerSnapshot, Connector, HttpConnector, McpClient, McpError, SessionState};
use crate::resilience::{CircuitBreaker, RateLimiter};

/// Failure to assemble the production stack.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Tools(#[from] McpError),

    #[error(transparent)]
    Model(#[from] InferenceError),
}

/// Inbound request body.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
        }
    }
}

/// Status code plus JSON body, independent of any HTTP framework.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl GatewayResponse {
    fn error(status: u16, message: &str, session_id: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message, "session_id": session_id }),
        }
    }
}

/// Snapshot served by health checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub tool_count: usize,
    pub sessions: Vec<(String, SessionState)>,
    pub breakers: std::collections::BTreeMap<String, BreakerSnapshot>,
    pub model_breaker: Option<BreakerSnapshot>,
    pub model_reachable: bool,
}

// ─── OrchestratorService ────────────────────────────────────────────────────

pub struct OrchestratorService {
    client: Arc<McpClient>,
    engine: OrchestrationEngine,
    limiter: RateLimiter,
    request_timeout: Duration,
    started_at: DateTime<Utc>,
}

impl OrchestratorService {
    pub fn new(
        client: Arc<McpClient>,
        engine: OrchestrationEngine,
        limiter: RateLimiter,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            engine,
            limiter,
            request_timeout,
            started_at: Utc::now(),
        }
    }

    /// Wire the production stack from settings: HTTP tool transports and an
    /// OpenAI-compatible model endpoint.
    pub fn from_settings(settings: &Settings) -> Result<Self, GatewayError> {
        let connector: Arc<dyn Connector> =
            Arc::new(HttpConnector::new(settings.client_options().call_timeout)?);
        let model: Arc<dyn ReasoningModel> =
            Arc::new(InferenceClient::from_config(settings.model.clone())?);
        Ok(Self::with_parts(settings, connector, model))
    }

    /// Build the service around caller-supplied tool connector and model.
    pub fn with_parts(
        settings: &Settings,
        connector: Arc<dyn Connector>,
        model: Arc<dyn ReasoningModel>,
    ) -> Self {
        let client = Arc::new(McpClient::new(
            settings.servers.clone(),
            connector,
            settings.client_options(),
        ));

        let orchestration = &settings.orchestration;
        let mut engine = OrchestrationEngine::new(Arc::clone(&client), model)
            .with_max_turns(orchestration.max_turns);
        if let Some(prompt) = &orchestration.system_prompt {
            engine = engine.with_system_prompt(prompt.as_str());
        }
        if settings.resilience.model_circuit_breaker {
            engine = engine.with_model_breaker(Arc::new(CircuitBreaker::new(
                "model",
                settings.resilience.breaker(),
            )));
        }

        let limiter = RateLimiter::new(settings.resilience.rate_limit, settings.resilience.rate_window());
        Self::new(client, engine, limiter, settings.request_timeout())
    }

    /// Open every session and register the tool catalog.
    ///
    /// Servers that fail are logged and returned; their tools stay absent.
    pub async fn start(&self) -> Vec<(String, McpError)> {
        let failures = self.client.start_all().await;
        for (server, e) in &failures {
            tracing::error!(server = %server, error = %e, "tool server unavailable");
        }
        tracing::info!(tools = self.client.tool_count().await, "orchestrator started");
        failures
    }

    /// Release every session. Requests are refused until the next `start`.
    pub async fn stop(&self) {
        tracing::info!("orchestrator stopping");
        self.client.shutdown_all().await;
    }

    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    pub fn engine(&self) -> &OrchestrationEngine {
        &self.engine
    }

    /// Handle one inbound message for the caller `identity`.
    pub async fn handle_message(&self, identity: &str, request: ChatRequest) -> GatewayResponse {
        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if let Err(e) = self.limiter.check(identity) {
            tracing::warn!(identity = %identity, session_id = %session_id, error = %e, "request rejected");
            return GatewayResponse::error(429, "Rate limit exceeded", &session_id);
        }

        let message = request.message.trim();
        if message.is_empty() {
            return GatewayResponse::error(400, "No message provided", &session_id);
        }

        if self.client.is_stopped() {
            tracing::warn!(session_id = %session_id, "request received after stop");
            return GatewayResponse::error(503, "Service stopped", &session_id);
        }

        tracing::info!(identity = %identity, session_id = %session_id, "processing message");
        let run = tokio::time::timeout(self.request_timeout, self.engine.process_request(message));

        match run.await {
            Ok(Ok(transcript)) => GatewayResponse {
                status: 202,
                body: json!({
                    "status": "accepted",
                    "session_id": session_id,
                    "transcript": transcript,
                }),
            },
            Ok(Err(e)) if e.circuit_open().is_some() => {
                tracing::warn!(session_id = %session_id, error = %e, "run rejected by circuit breaker");
                GatewayResponse::error(503, &e.to_string(), &session_id)
            }
            Ok(Err(e)) => {
                tracing::error!(session_id = %session_id, error = %e, "run failed");
                GatewayResponse::error(500, &e.to_string(), &session_id)
            }
            Err(_) => {
                tracing::error!(
                    session_id = %session_id,
                    timeout_secs = self.request_timeout.as_secs(),
                    "request timed out"
                );
                GatewayResponse::error(
                    500,
                    &format!("Request timed out after {}s", self.request_timeout.as_secs()),
                    &session_id,
                )
            }
        }
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            tool_count: self.client.tool_count().await,
            sessions: self.client.session_states().await,
            breakers: self.client.breaker_states().await,
            model_breaker: self.engine.model_breaker().map(|b| BreakerSnapshot {
                state: b.state(),
                failures: b.failure_count(),
            }),
            model_reachable: self.engine.model_reachable().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_fields_default() {
        let request: ChatRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.message.is_empty());
        assert!(request.session_id.is_none());
    }

    #[tokio::test]
    async fn test_from_settings_defers_connections() {
        let service = OrchestratorService::from_settings(&Settings::default()).unwrap();
        assert!(service.engine().model_breaker().is_some());
        assert_eq!(service.client().configured_servers(), vec!["url-fetcher", "random-web"]);

        let health = service.health().await;
        assert_eq!(health.tool_count, 0);
        assert!(health.sessions.is_empty());
    }
}
