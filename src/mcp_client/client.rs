//! MCP Client: high-level interface for tool execution.
//!
//! Owns the configured sessions and the registry built from them. This is
//! the tool-side API used by the orchestration engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use crate::resilience::CircuitBreakerConfig;

use super::errors::McpError;
use super::registry::{BreakerSnapshot, CollisionPolicy, ToolRegistry};
use super::session::{SessionState, ToolServerSession};
use super::transport::Connector;
use super::types::{ServerConfig, ToolDescriptor, ToolOutput};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for tool call execution.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs shared by every session and the registry.
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub collision_policy: CollisionPolicy,
    pub breaker: CircuitBreakerConfig,
    pub call_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            collision_policy: CollisionPolicy::default(),
            breaker: CircuitBreakerConfig::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Manages sessions to every configured server and routes tool calls.
pub struct McpClient {
    configs: Vec<ServerConfig>,
    connector: Arc<dyn Connector>,
    options: ClientOptions,
    sessions: RwLock<Vec<Arc<ToolServerSession>>>,
    registry: RwLock<ToolRegistry>,
    /// Serializes registration phases and shutdown.
    lifecycle: Mutex<()>,
    /// Set by `shutdown_all`, cleared by `start_all`.
    stopped: AtomicBool,
}

impl McpClient {
    pub fn new(configs: Vec<ServerConfig>, connector: Arc<dyn Connector>, options: ClientOptions) -> Self {
        Self {
            configs,
            connector,
            options,
            sessions: RwLock::new(Vec::new()),
            registry: RwLock::new(ToolRegistry::new(options.collision_policy, options.breaker)),
            lifecycle: Mutex::new(()),
            stopped: AtomicBool::new(false),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Open a session to every configured server and rebuild the registry.
    ///
    /// Sessions are established concurrently, then registered in
    /// configuration order. Returns the servers that failed; partial startup
    /// is OK and their tools are simply absent.
    pub async fn start_all(&self) -> Vec<(String, McpError)> {
        let _guard = self.lifecycle.lock().await;
        self.stopped.store(false, Ordering::SeqCst);
        self.start_all_locked().await
    }

    async fn start_all_locked(&self) -> Vec<(String, McpError)> {
        self.shutdown_sessions().await;

        let pending: Vec<Arc<ToolServerSession>> = self
            .configs
            .iter()
            .map(|config| {
                Arc::new(ToolServerSession::new(
                    config.clone(),
                    Arc::clone(&self.connector),
                    self.options.call_timeout,
                ))
            })
            .collect();
        // Tracked before any handshake starts: if this future is dropped
        // mid-registration, the next shutdown still reaches every session.
        *self.sessions.write().await = pending.clone();

        let mut handles = Vec::with_capacity(pending.len());
        for session in pending {
            let task_session = Arc::clone(&session);
            let handle = tokio::spawn(async move {
                task_session.initialize().await?;
                match task_session.list_tools().await {
                    Ok(tools) => Ok(tools),
                    Err(e) => {
                        task_session.cleanup().await;
                        Err(e)
                    }
                }
            });
            handles.push((session, handle));
        }

        let mut registry = ToolRegistry::new(self.options.collision_policy, self.options.breaker);
        let mut ready = Vec::new();
        let mut errors = Vec::new();

        for (session, handle) in handles {
            let name = session.name().to_string();
            match handle.await {
                Ok(Ok(tools)) => {
                    tracing::info!(server = %name, tools = tools.len(), "server registered");
                    for collision in registry.register_server_tools(Arc::clone(&session), tools) {
                        errors.push((name.clone(), collision));
                    }
                    ready.push(session);
                }
                Ok(Err(e)) => {
                    tracing::error!(server = %name, error = %e, "server failed to start");
                    errors.push((name, e));
                }
                Err(e) => {
                    session.cleanup().await;
                    errors.push((
                        name.clone(),
                        McpError::ConnectionFailed {
                            server: name,
                            reason: format!("join error: {e}"),
                        },
                    ));
                }
            }
        }

        tracing::info!(
            servers = ready.len(),
            failed = errors.len(),
            tools = registry.len(),
            "tool registry built"
        );

        *self.sessions.write().await = ready;
        *self.registry.write().await = registry;
        errors
    }

    /// Run the registration phase if no tools are registered yet.
    ///
    /// Does nothing after [`shutdown_all`](Self::shutdown_all) until the next
    /// [`start_all`](Self::start_all).
    pub async fn ensure_started(&self) -> Vec<(String, McpError)> {
        let _guard = self.lifecycle.lock().await;
        if self.is_stopped() {
            tracing::debug!("client stopped, skipping lazy registration");
            return Vec::new();
        }
        if !self.registry.read().await.is_empty() {
            return Vec::new();
        }
        self.start_all_locked().await
    }

    /// Close every session and empty the registry.
    pub async fn shutdown_all(&self) {
        let _guard = self.lifecycle.lock().await;
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown_sessions().await;
    }

    /// Whether `shutdown_all` ran since the last `start_all`.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn shutdown_sessions(&self) {
        *self.registry.write().await =
            ToolRegistry::new(self.options.collision_policy, self.options.breaker);
        let sessions = std::mem::take(&mut *self.sessions.write().await);
        if sessions.is_empty() {
            return;
        }

        // Different sessions tear down concurrently.
        futures::future::join_all(sessions.iter().map(|s| s.cleanup())).await;
        tracing::info!(count = sessions.len(), "tool server sessions closed");
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Execute a tool call, routing to the owning server.
    ///
    /// The registry lock is released before the remote call.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, McpError> {
        let route = self.registry.read().await.route(tool_name)?;
        route.invoke(arguments).await
    }

    // ─── Status ──────────────────────────────────────────────────────────

    /// Every registered tool, sorted by name.
    pub async fn catalog(&self) -> Vec<ToolDescriptor> {
        self.registry.read().await.catalog()
    }

    /// Get the number of registered tools.
    pub async fn tool_count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Names of all configured servers, in configuration order.
    pub fn configured_servers(&self) -> Vec<String> {
        self.configs.iter().map(|c| c.name.clone()).collect()
    }

    /// Lifecycle state of each tracked session.
    pub async fn session_states(&self) -> Vec<(String, SessionState)> {
        let sessions = self.sessions.read().await.clone();
        let mut states = Vec::with_capacity(sessions.len());
        for session in sessions {
            states.push((session.name().to_string(), session.state().await));
        }
        states
    }

    /// Breaker state per registered server.
    pub async fn breaker_states(&self) -> std::collections::BTreeMap<String, BreakerSnapshot> {
        self.registry.read().await.breaker_states()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
