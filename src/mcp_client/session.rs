//! Lifecycle of one connection to a tool server.
//!
//! `Uninitialized → Connecting → Ready → Closed`, with `Connecting → Closed`
//! when establishment fails. `Closed` is terminal. A session owns two
//! resources, the transport and the protocol session running over it, and
//! releases them independently during teardown.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use super::errors::McpError;
use super::protocol::RpcSession;
use super::transport::{Connector, Transport};
use super::types::{InitializeResult, ServerConfig, ToolDescriptor, ToolOutput};

/// Timeout for the initialize handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state of a [`ToolServerSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Ready,
    Closed,
}

struct SessionInner {
    state: SessionState,
    transport: Option<Arc<dyn Transport>>,
    rpc: Option<Arc<RpcSession>>,
    capabilities: Option<InitializeResult>,
}

// ─── ToolServerSession ───────────────────────────────────────────────────────

/// One logical connection to a backend tool server.
///
/// The inner lock is held across `.await` only by [`cleanup`](Self::cleanup),
/// which makes teardown run at most once; every other operation holds it just
/// long enough to read or swap state.
pub struct ToolServerSession {
    config: ServerConfig,
    connector: Arc<dyn Connector>,
    call_timeout: Duration,
    inner: Mutex<SessionInner>,
}

impl ToolServerSession {
    pub fn new(config: ServerConfig, connector: Arc<dyn Connector>, call_timeout: Duration) -> Self {
        Self {
            config,
            connector,
            call_timeout,
            inner: Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                transport: None,
                rpc: None,
                capabilities: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Capabilities recorded during the handshake, once `Ready`.
    pub async fn capabilities(&self) -> Option<serde_json::Value> {
        self.inner
            .lock()
            .await
            .capabilities
            .as_ref()
            .map(|c| c.capabilities.clone())
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Connect and perform the handshake.
    ///
    /// On failure the session is cleaned up (and therefore `Closed`) before
    /// the error is returned. There is no retry: a failed session stays
    /// closed and its tools stay out of the registry.
    pub async fn initialize(&self) -> Result<(), McpError> {
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Uninitialized => inner.state = SessionState::Connecting,
                SessionState::Ready => return Ok(()),
                state => {
                    return Err(McpError::NotInitialized {
                        server: self.config.name.clone(),
                        state,
                    })
                }
            }
        }

        tracing::info!(server = %self.config.name, url = %self.config.url, "connecting to tool server");

        match self.establish().await {
            Ok(()) => {
                tracing::info!(server = %self.config.name, "tool server session ready");
                Ok(())
            }
            Err(e) => {
                tracing::error!(server = %self.config.name, error = %e, "failed to initialize session");
                self.cleanup().await;
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), McpError> {
        let transport = self.connector.connect(&self.config).await?;
        let rpc = Arc::new(RpcSession::new(&self.config.name, Arc::clone(&transport)));

        {
            let mut inner = self.inner.lock().await;
            if inner.state == SessionState::Closed {
                drop(inner);
                // Cleanup won the race; these resources were never recorded.
                if let Err(e) = transport.close().await {
                    tracing::warn!(server = %self.config.name, error = %e, "error releasing transport");
                }
                return Err(self.closed_during_init());
            }
            inner.transport = Some(transport);
            inner.rpc = Some(Arc::clone(&rpc));
        }

        let init = tokio::time::timeout(INIT_TIMEOUT, rpc.initialize())
            .await
            .map_err(|_| McpError::ConnectionFailed {
                server: self.config.name.clone(),
                reason: format!("handshake timed out after {}s", INIT_TIMEOUT.as_secs()),
            })??;

        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Closed {
            return Err(self.closed_during_init());
        }
        inner.state = SessionState::Ready;
        inner.capabilities = Some(init);
        Ok(())
    }

    fn closed_during_init(&self) -> McpError {
        McpError::ConnectionFailed {
            server: self.config.name.clone(),
            reason: "session closed during initialization".into(),
        }
    }

    /// Release the protocol session and the transport.
    ///
    /// Idempotent and safe to call concurrently: the first caller performs
    /// the teardown, later callers return immediately. Each release is
    /// attempted even if the other fails; failures are logged, never raised.
    pub async fn cleanup(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Closed {
            return;
        }

        if let Some(rpc) = inner.rpc.take() {
            rpc.close().await;
        }
        if let Some(transport) = inner.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::warn!(server = %self.config.name, error = %e, "error releasing transport");
            }
        }

        inner.capabilities = None;
        inner.state = SessionState::Closed;
        tracing::info!(server = %self.config.name, "tool server session closed");
    }

    // ─── Operations ──────────────────────────────────────────────────────

    /// The protocol session, if `Ready`.
    async fn ready_rpc(&self) -> Result<Arc<RpcSession>, McpError> {
        let inner = self.inner.lock().await;
        match (&inner.rpc, inner.state) {
            (Some(rpc), SessionState::Ready) => Ok(Arc::clone(rpc)),
            (_, state) => Err(McpError::NotInitialized {
                server: self.config.name.clone(),
                state,
            }),
        }
    }

    /// Query the server's current tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let rpc = self.ready_rpc().await?;
        rpc.list_tools().await
    }

    /// Invoke `tool_name` on the server.
    ///
    /// Every remote-side failure, including a result flagged `isError` and a
    /// call exceeding the timeout, becomes [`McpError::ToolExecution`].
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, McpError> {
        let rpc = self.ready_rpc().await?;
        let failed = |reason: String| McpError::ToolExecution {
            tool: tool_name.to_string(),
            server: self.config.name.clone(),
            reason,
        };

        let output = match tokio::time::timeout(self.call_timeout, rpc.call_tool(tool_name, arguments)).await {
            Err(_) => {
                return Err(failed(format!(
                    "timed out after {}ms",
                    self.call_timeout.as_millis()
                )))
            }
            Ok(Err(e)) => return Err(failed(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if output.is_error {
            return Err(failed(output.to_text()));
        }
        Ok(output)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
