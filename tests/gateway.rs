//! Inbound boundary: admission control, status mapping and lifecycle.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use toolmesh::inference::{InferenceError, Message, ModelResponse, ReasoningModel};
use toolmesh::mcp_client::local::{LocalConnector, LocalToolServer};
use toolmesh::mcp_client::{Connector, McpError, ServerConfig, SessionState, ToolDescriptor, Transport};
use toolmesh::resilience::CircuitState;
use toolmesh::{ChatRequest, OrchestratorService, Settings};

use common::*;

struct Fixture {
    service: OrchestratorService,
    model: Arc<ScriptedModel>,
    fetcher: Arc<LocalToolServer>,
    web: Arc<LocalToolServer>,
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.servers = server_configs();
    settings
}

fn fixture(settings: Settings, script: Vec<Result<ModelResponse, InferenceError>>) -> Fixture {
    let fetcher = url_fetcher();
    let web = random_web();
    let model = ScriptedModel::new(script);
    let model_dyn: Arc<dyn ReasoningModel> = model.clone();
    let service = OrchestratorService::with_parts(&settings, connector(&fetcher, &web), model_dyn);
    Fixture {
        service,
        model,
        fetcher,
        web,
    }
}

#[tokio::test]
async fn test_accepted_response_carries_transcript() {
    let f = fixture(settings(), random_site_title_script());
    assert!(f.service.start().await.is_empty());

    let request = ChatRequest {
        message: "Get a random website and tell me its title".into(),
        session_id: Some("abc-123".into()),
    };
    let response = f.service.handle_message("10.0.0.1", request).await;

    assert_eq!(response.status, 202);
    assert_eq!(response.body["status"], "accepted");
    assert_eq!(response.body["session_id"], "abc-123");
    let transcript = response.body["transcript"].as_array().unwrap();
    assert_eq!(transcript.len(), 6);
    assert_eq!(transcript[1], json!({"role": "assistant", "tool_use": {"name": "RandomWeb", "input": {}}}));
    assert_eq!(
        transcript[4],
        json!({"role": "tool", "name": "URLTitleFetcher", "result": RANDOM_SITE_TITLE})
    );
}

#[tokio::test]
async fn test_session_id_generated_when_absent() {
    let f = fixture(settings(), vec![Ok(text("hello"))]);
    let response = f.service.handle_message("10.0.0.1", ChatRequest::new("hi")).await;

    assert_eq!(response.status, 202);
    let id = response.body["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let f = fixture(settings(), vec![]);
    let response = f.service.handle_message("10.0.0.1", ChatRequest::new("   ")).await;

    assert_eq!(response.status, 400);
    assert!(response.body["error"].is_string());
    assert_eq!(f.model.calls(), 0);
}

#[tokio::test]
async fn test_rate_limit_per_identity() {
    let mut settings = settings();
    settings.resilience.rate_limit = 2;
    let f = fixture(settings, vec![]);

    for _ in 0..2 {
        let response = f.service.handle_message("10.0.0.1", ChatRequest::new("hi")).await;
        assert_eq!(response.status, 202);
    }

    let request = ChatRequest {
        message: "hi".into(),
        session_id: Some("s-1".into()),
    };
    let rejected = f.service.handle_message("10.0.0.1", request).await;
    assert_eq!(rejected.status, 429);
    assert_eq!(rejected.body, json!({"error": "Rate limit exceeded", "session_id": "s-1"}));

    // Other identities keep their own budget.
    let other = f.service.handle_message("10.0.0.2", ChatRequest::new("hi")).await;
    assert_eq!(other.status, 202);
    assert_eq!(f.model.calls(), 3);
}

#[tokio::test]
async fn test_model_breaker_maps_to_service_unavailable() {
    let mut settings = settings();
    settings.resilience.circuit_failure_threshold = 1;
    let f = fixture(
        settings,
        vec![Err(InferenceError::ConnectionFailed {
            endpoint: "http://localhost:11434/v1".into(),
            reason: "connection refused".into(),
        })],
    );

    let first = f.service.handle_message("10.0.0.1", ChatRequest::new("hi")).await;
    assert_eq!(first.status, 202);
    let message = first.body["transcript"][0]["message"].as_str().unwrap();
    assert!(message.starts_with("Error: connection failed"));

    let second = f.service.handle_message("10.0.0.1", ChatRequest::new("hi")).await;
    assert_eq!(second.status, 503);
    assert!(second.body["error"].as_str().unwrap().contains("circuit breaker 'model' is open"));
    assert_eq!(f.model.calls(), 1);

    let health = f.service.health().await;
    assert_eq!(health.model_breaker.unwrap().state, CircuitState::Open);
}

#[tokio::test]
async fn test_tool_breaker_maps_to_service_unavailable() {
    let mut settings = settings();
    settings.resilience.circuit_failure_threshold = 1;
    let f = fixture(
        settings,
        vec![
            Ok(tool_request("call_1", "URLTitleFetcher", json!({"url": "https://down.invalid"}))),
            Ok(tool_request("call_2", "URLTitleFetcher", json!({"url": RANDOM_SITE}))),
        ],
    );
    f.service.start().await;

    let response = f.service.handle_message("10.0.0.1", ChatRequest::new("title?")).await;
    assert_eq!(response.status, 503);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("circuit breaker 'url-fetcher' is open"));
    assert_eq!(f.fetcher.tool_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_maps_to_internal_error() {
    let mut settings = settings();
    settings.orchestration.request_timeout_secs = 5;
    let fetcher = url_fetcher();
    let web = random_web();
    let model: Arc<dyn ReasoningModel> = Arc::new(StalledModel);
    let service = OrchestratorService::with_parts(&settings, connector(&fetcher, &web), model);

    let response = service.handle_message("10.0.0.1", ChatRequest::new("hi")).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body["error"], "Request timed out after 5s");
}

#[tokio::test]
async fn test_stop_releases_sessions() {
    let f = fixture(settings(), vec![]);
    f.service.start().await;

    let health = f.service.health().await;
    assert_eq!(health.tool_count, 2);
    assert!(health.sessions.iter().all(|(_, s)| *s == SessionState::Ready));
    assert_eq!(health.breakers.len(), 2);
    assert!(health.model_reachable);

    f.service.stop().await;
    let health = f.service.health().await;
    assert_eq!(health.tool_count, 0);
    assert!(health.sessions.is_empty());
    assert_eq!(f.fetcher.closed_transports(), 1);
    assert_eq!(f.web.closed_transports(), 1);
}

#[tokio::test]
async fn test_requests_refused_after_stop() {
    let f = fixture(settings(), vec![]);
    f.service.start().await;
    f.service.stop().await;

    let request = ChatRequest {
        message: "hi".into(),
        session_id: Some("s-9".into()),
    };
    let response = f.service.handle_message("10.0.0.1", request).await;
    assert_eq!(response.status, 503);
    assert_eq!(response.body, json!({"error": "Service stopped", "session_id": "s-9"}));

    // No session was reopened behind the caller's back.
    assert_eq!(f.fetcher.connections(), 1);
    assert_eq!(f.web.connections(), 1);
    assert!(f.service.health().await.sessions.is_empty());
    assert_eq!(f.model.calls(), 0);

    f.service.start().await;
    let response = f.service.handle_message("10.0.0.1", ChatRequest::new("hi")).await;
    assert_eq!(response.status, 202);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_registration_is_released_on_stop() {
    let mut settings = settings();
    settings.orchestration.request_timeout_secs = 1;
    let fetcher = url_fetcher();
    let web = random_web();
    let slow: Arc<dyn Connector> = Arc::new(SlowConnector {
        inner: connector(&fetcher, &web),
        delay: Duration::from_secs(2),
    });
    let model: Arc<dyn ReasoningModel> = ScriptedModel::new(vec![]);
    let service = OrchestratorService::with_parts(&settings, slow, model);

    let response = service.handle_message("10.0.0.1", ChatRequest::new("hi")).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body["error"], "Request timed out after 1s");

    // The handshakes finish after the caller gave up.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.connections(), 1);
    assert_eq!(web.connections(), 1);

    service.stop().await;
    assert_eq!(fetcher.closed_transports(), 1);
    assert_eq!(web.closed_transports(), 1);
    assert!(service.health().await.sessions.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_keep_separate_transcripts() {
    let f = fixture(settings(), vec![]);

    let messages: Vec<String> = (0..8).map(|i| format!("question {i}")).collect();
    let requests = messages.iter().enumerate().map(|(i, message)| {
        let identity = format!("10.0.0.{i}");
        let service = &f.service;
        async move { service.handle_message(&identity, ChatRequest::new(message.as_str())).await }
    });
    let responses = futures::future::join_all(requests).await;

    for (message, response) in messages.iter().zip(&responses) {
        assert_eq!(response.status, 202);
        let transcript = response.body["transcript"].as_array().unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], json!({"role": "user", "message": message}));
        assert_eq!(transcript[1], json!({"role": "assistant", "message": "done"}));
    }

    // Lazy registration ran once for all of them.
    assert_eq!(f.fetcher.connections(), 1);
    assert_eq!(f.web.connections(), 1);
    assert_eq!(f.model.calls(), 8);
}

#[tokio::test]
async fn test_settings_file_drives_service() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "servers:\n  - {{name: url-fetcher, url: '{FETCHER_URL}'}}\norchestration:\n  max_turns: 1\n"
    )
    .unwrap();
    let settings = Settings::load(file.path()).unwrap();

    let f = fixture(
        settings,
        vec![Ok(tool_request("call_1", "URLTitleFetcher", json!({"url": RANDOM_SITE})))],
    );
    let response = f.service.handle_message("10.0.0.1", ChatRequest::new("title?")).await;

    assert_eq!(response.status, 202);
    let transcript = response.body["transcript"].as_array().unwrap();
    assert_eq!(
        transcript.last().unwrap()["message"],
        "Stopped after 1 turns without a final answer."
    );
    assert_eq!(f.model.seen_tools()[0], vec!["URLTitleFetcher"]);
}

/// Never answers.
struct StalledModel;

#[async_trait]
impl ReasoningModel for StalledModel {
    async fn invoke(
        &self,
        _system: &str,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<ModelResponse, InferenceError> {
        std::future::pending().await
    }
}

/// Delays every connection before handing it to the in-process servers.
struct SlowConnector {
    inner: Arc<LocalConnector>,
    delay: Duration,
}

#[async_trait]
impl Connector for SlowConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn Transport>, McpError> {
        tokio::time::sleep(self.delay).await;
        self.inner.connect(config).await
    }
}
