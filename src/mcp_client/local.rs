//! In-process tool servers.
//!
//! A [`LocalToolServer`] is an explicit command table: tool descriptors paired
//! with handler closures. [`LocalConnector`] hands out transports that speak
//! the same JSON-RPC methods as a remote server, so sessions, the registry and
//! the orchestration loop run against it unchanged. Used by tests and for
//! embedding tools directly in a host process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::errors::McpError;
use super::protocol::SHUTDOWN_NOTICE;
use super::transport::{next_request_id, Connector, Transport};
use super::types::{
    error_codes, JsonRpcResponse, ServerConfig, ToolDescriptor, ToolOutput, PROTOCOL_VERSION,
};

/// A tool implementation: arguments in, text or an error message out.
pub type ToolHandler = Arc<dyn Fn(&Value) -> Result<String, String> + Send + Sync>;

// ─── LocalToolServer ─────────────────────────────────────────────────────────

/// A tool server backed by a table of handlers.
pub struct LocalToolServer {
    name: String,
    tools: Vec<(ToolDescriptor, ToolHandler)>,
    reject_handshake: bool,
    connections: AtomicUsize,
    closed_transports: AtomicUsize,
    shutdown_notices: AtomicUsize,
    tool_calls: AtomicUsize,
}

impl LocalToolServer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: Vec::new(),
            reject_handshake: false,
            connections: AtomicUsize::new(0),
            closed_transports: AtomicUsize::new(0),
            shutdown_notices: AtomicUsize::new(0),
            tool_calls: AtomicUsize::new(0),
        }
    }

    /// Add a tool to the table.
    pub fn tool<F>(mut self, descriptor: ToolDescriptor, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<String, String> + Send + Sync + 'static,
    {
        self.tools.push((descriptor, Arc::new(handler)));
        self
    }

    /// Answer every `initialize` with an error.
    pub fn reject_handshake(mut self) -> Self {
        self.reject_handshake = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transports opened against this server.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Transports released by their owner.
    pub fn closed_transports(&self) -> usize {
        self.closed_transports.load(Ordering::SeqCst)
    }

    /// `shutdown` notifications received.
    pub fn shutdown_notices(&self) -> usize {
        self.shutdown_notices.load(Ordering::SeqCst)
    }

    /// `tools/call` requests received.
    pub fn tool_calls(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }

    fn handle(&self, id: u64, method: &str, params: Option<Value>) -> JsonRpcResponse {
        match method {
            "initialize" if self.reject_handshake => {
                JsonRpcResponse::failure(id, error_codes::INTERNAL_ERROR, "handshake rejected")
            }
            "initialize" => JsonRpcResponse::success(
                id,
                serde_json::json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": self.name, "version": "local"},
                }),
            ),
            "tools/list" => {
                let tools: Vec<&ToolDescriptor> = self.tools.iter().map(|(d, _)| d).collect();
                JsonRpcResponse::success(id, serde_json::json!({ "tools": tools }))
            }
            "tools/call" => self.call(id, params.unwrap_or(Value::Null)),
            other => JsonRpcResponse::failure(
                id,
                error_codes::METHOD_NOT_FOUND,
                &format!("method not found: {other}"),
            ),
        }
    }

    fn call(&self, id: u64, params: Value) -> JsonRpcResponse {
        self.tool_calls.fetch_add(1, Ordering::SeqCst);

        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::failure(id, error_codes::INVALID_PARAMS, "missing tool name");
        };
        let Some((_, handler)) = self.tools.iter().find(|(d, _)| d.name == name) else {
            return JsonRpcResponse::failure(
                id,
                error_codes::INVALID_PARAMS,
                &format!("Unknown tool: {name}"),
            );
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        let output = match handler(&arguments) {
            Ok(text) => ToolOutput::text(text),
            Err(message) => ToolOutput {
                is_error: true,
                ..ToolOutput::text(message)
            },
        };

        match serde_json::to_value(output) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::failure(id, error_codes::INTERNAL_ERROR, &e.to_string()),
        }
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

struct LocalTransport {
    server: Arc<LocalToolServer>,
    closed: AtomicBool,
}

impl LocalTransport {
    fn ensure_open(&self) -> Result<(), McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportError {
                server: self.server.name.clone(),
                reason: "transport closed".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        self.ensure_open()?;
        Ok(self.server.handle(next_request_id(), method, params))
    }

    async fn notify(&self, method: &str, _params: Option<Value>) -> Result<(), McpError> {
        self.ensure_open()?;
        if method == SHUTDOWN_NOTICE {
            self.server.shutdown_notices.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.server.closed_transports.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ─── Connector ───────────────────────────────────────────────────────────────

/// Routes endpoints to in-process servers.
#[derive(Default)]
pub struct LocalConnector {
    servers: HashMap<String, Arc<LocalToolServer>>,
}

impl LocalConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `server` at `url`.
    pub fn with_server(mut self, url: &str, server: Arc<LocalToolServer>) -> Self {
        self.servers.insert(url.to_string(), server);
        self
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<Arc<dyn Transport>, McpError> {
        let server = self
            .servers
            .get(&config.url)
            .ok_or_else(|| McpError::ConnectionFailed {
                server: config.name.clone(),
                reason: format!("connection refused: {}", config.url),
            })?;
        server.connections.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(LocalTransport {
            server: Arc::clone(server),
            closed: AtomicBool::new(false),
        }))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
