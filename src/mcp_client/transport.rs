//! JSON-RPC transports for tool servers.
//!
//! The session layer only sees the [`Transport`] and [`Connector`] traits.
//! [`HttpTransport`] is the concrete adapter used against real services:
//! each request is an HTTP POST carrying one JSON-RPC message, and the reply
//! is either a JSON body or a `text/event-stream` body whose `data:` lines
//! hold JSON-RPC messages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

use super::errors::McpError;
use super::types::{error_codes, JsonRpcRequest, JsonRpcResponse, ServerConfig};

/// Header carrying the server-assigned session identifier.
const SESSION_HEADER: &str = "mcp-session-id";

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// A bidirectional JSON-RPC channel to one tool server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the response with the matching id.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification (no response expected).
    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError>;

    /// Release the underlying connection.
    async fn close(&self) -> Result<(), McpError>;
}

/// Opens transports to configured servers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn Transport>, McpError>;
}

// ─── HTTP Transport ──────────────────────────────────────────────────────────

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    server_name: String,
    url: String,
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    pub fn new(server_name: &str, url: &str, http: reqwest::Client) -> Self {
        Self {
            server_name: server_name.to_string(),
            url: url.to_string(),
            http,
            session_id: Mutex::new(None),
        }
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }

    /// POST one JSON-RPC message, remembering any session id the server assigns.
    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, McpError> {
        let mut builder = self
            .http
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(id) = self.session_id() {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_error(format!("request to {} failed: {e}", self.url)))?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self
                .session_id
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.transport_error(format!("HTTP {status}: {text}")));
        }

        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let body = serde_json::to_value(&req)
            .map_err(|e| self.transport_error(format!("failed to serialize request: {e}")))?;

        let response = self.post(&body).await?;
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(format!("failed to read response body: {e}")))?;

        let parsed = if is_event_stream {
            parse_event_stream(&text, id)
        } else {
            serde_json::from_str::<JsonRpcResponse>(&text).ok()
        };

        parsed.ok_or_else(|| McpError::ProtocolError {
            server: self.server_name.clone(),
            reason: format!("no JSON-RPC response for request {id} ({method})"),
        })
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.post(&notification).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), McpError> {
        let Some(id) = self.session_id() else {
            return Ok(());
        };

        let response = self
            .http
            .delete(&self.url)
            .header(SESSION_HEADER, id)
            .send()
            .await
            .map_err(|e| self.transport_error(format!("failed to end session: {e}")))?;

        // Servers that do not support explicit termination answer 405.
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            Ok(())
        } else {
            Err(self.transport_error(format!("session termination returned HTTP {status}")))
        }
    }
}

/// Find the response to request `id` among the `data:` events of an SSE body.
fn parse_event_stream(body: &str, id: u64) -> Option<JsonRpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcResponse>(data.trim()).ok())
        .find(|resp| resp.id == id)
}

/// Connector producing [`HttpTransport`]s that share one connection pool.
pub struct HttpConnector {
    http: reqwest::Client,
}

impl HttpConnector {
    /// Build a connector whose requests time out after `request_timeout`.
    pub fn new(request_timeout: Duration) -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()
            .map_err(|e| McpError::ConnectionFailed {
                server: "*".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn Transport>, McpError> {
        let parsed = reqwest::Url::parse(&config.url).map_err(|e| McpError::ConnectionFailed {
            server: config.name.clone(),
            reason: format!("invalid url '{}': {e}", config.url),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(McpError::ConnectionFailed {
                server: config.name.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Arc::new(HttpTransport::new(
            &config.name,
            &config.url,
            self.http.clone(),
        )))
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
