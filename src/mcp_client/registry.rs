//! Tool registry: aggregates tool catalogs across all ready sessions.
//!
//! Provides:
//! - Tool lookup by exposed name, resolving to exactly one owning session
//! - A configurable policy for names advertised by more than one server
//! - One circuit breaker per server, wrapped around every invocation routed
//!   to it

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

use super::errors::McpError;
use super::session::ToolServerSession;
use super::types::{ToolDescriptor, ToolOutput};

// ─── Collision Policy ────────────────────────────────────────────────────────

/// What to do when a server advertises a tool name that is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The later registration replaces the earlier one.
    #[default]
    Override,
    /// The first owner keeps the name; the collision is reported.
    Reject,
    /// The later tool is exposed as `server.tool`.
    Prefix,
}

// ─── ToolRegistry ────────────────────────────────────────────────────────────

struct RegisteredTool {
    /// Descriptor as exposed to the model (name may be prefixed).
    descriptor: ToolDescriptor,
    /// Name the owning server knows the tool by.
    remote_name: String,
    session: Arc<ToolServerSession>,
}

/// Snapshot of one server's breaker for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
}

/// Aggregated registry across all ready sessions.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    policy: CollisionPolicy,
    breaker_config: CircuitBreakerConfig,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new(policy: CollisionPolicy, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            tools: HashMap::new(),
            breakers: HashMap::new(),
            policy,
            breaker_config,
        }
    }

    /// Register the catalog of a ready session.
    ///
    /// Returns the rejected collisions: every clash under
    /// [`CollisionPolicy::Reject`], and under [`CollisionPolicy::Prefix`] a
    /// namespaced name that is itself already registered.
    pub fn register_server_tools(
        &mut self,
        session: Arc<ToolServerSession>,
        tools: Vec<ToolDescriptor>,
    ) -> Vec<McpError> {
        let server = session.name().to_string();
        let mut rejected = Vec::new();

        self.breakers
            .entry(server.clone())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(&server, self.breaker_config)));

        for tool in tools {
            let remote_name = tool.name.clone();
            let mut exposed = remote_name.clone();

            if let Some(existing) = self.tools.get(&exposed) {
                let owner = existing.session.name().to_string();
                match self.policy {
                    CollisionPolicy::Override => {
                        tracing::warn!(
                            tool = %exposed,
                            previous = %owner,
                            server = %server,
                            "tool name collision, later registration wins"
                        );
                    }
                    CollisionPolicy::Reject => {
                        tracing::warn!(
                            tool = %exposed,
                            owner = %owner,
                            server = %server,
                            "tool name collision, keeping first owner"
                        );
                        rejected.push(McpError::ToolCollision {
                            name: exposed,
                            existing: owner,
                            incoming: server.clone(),
                        });
                        continue;
                    }
                    CollisionPolicy::Prefix => {
                        exposed = format!("{server}.{remote_name}");
                        if let Some(taken) = self.tools.get(&exposed) {
                            let holder = taken.session.name().to_string();
                            tracing::warn!(
                                tool = %exposed,
                                owner = %holder,
                                server = %server,
                                "namespaced tool name already taken"
                            );
                            rejected.push(McpError::ToolCollision {
                                name: exposed,
                                existing: holder,
                                incoming: server.clone(),
                            });
                            continue;
                        }
                        tracing::info!(
                            tool = %remote_name,
                            exposed = %exposed,
                            owner = %owner,
                            "tool name collision, namespacing"
                        );
                    }
                }
            }

            let descriptor = ToolDescriptor {
                name: exposed.clone(),
                ..tool
            };
            self.tools.insert(
                exposed,
                RegisteredTool {
                    descriptor,
                    remote_name,
                    session: Arc::clone(&session),
                },
            );
        }

        tracing::debug!(server = %server, total = self.tools.len(), "registered server tools");
        rejected
    }

    /// Resolve an exposed tool name to its owner.
    pub fn route(&self, tool_name: &str) -> Result<Route, McpError> {
        let entry = self.tools.get(tool_name).ok_or_else(|| McpError::UnknownTool {
            name: tool_name.to_string(),
        })?;
        let breaker = self
            .breakers
            .get(entry.session.name())
            .cloned()
            .unwrap_or_else(|| {
                Arc::new(CircuitBreaker::new(entry.session.name(), self.breaker_config))
            });

        Ok(Route {
            tool_name: tool_name.to_string(),
            remote_name: entry.remote_name.clone(),
            session: Arc::clone(&entry.session),
            breaker,
        })
    }

    /// Route and invoke in one step.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, McpError> {
        self.route(tool_name)?.invoke(arguments).await
    }

    /// Every registered tool, sorted by exposed name.
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> =
            self.tools.values().map(|t| t.descriptor.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Get the server name that owns a tool.
    pub fn get_server_for_tool(&self, tool_name: &str) -> Option<&str> {
        self.tools.get(tool_name).map(|t| t.session.name())
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Names of servers that currently own at least one tool (sorted).
    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .values()
            .map(|t| t.session.name().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Breaker state per registered server.
    pub fn breaker_states(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .iter()
            .map(|(name, breaker)| {
                (
                    name.clone(),
                    BreakerSnapshot {
                        state: breaker.state(),
                        failures: breaker.failure_count(),
                    },
                )
            })
            .collect()
    }
}

// ─── Route ───────────────────────────────────────────────────────────────────

/// A resolved tool: the owning session and that server's breaker.
///
/// Detached from the registry so the caller can drop any registry lock
/// before the remote call.
pub struct Route {
    pub tool_name: String,
    remote_name: String,
    session: Arc<ToolServerSession>,
    breaker: Arc<CircuitBreaker>,
}

impl Route {
    pub fn server_name(&self) -> &str {
        self.session.name()
    }

    /// Execute the tool through the server's circuit breaker.
    pub async fn invoke(&self, arguments: serde_json::Value) -> Result<ToolOutput, McpError> {
        tracing::info!(tool = %self.tool_name, server = %self.server_name(), "dispatching tool call");
        self.breaker
            .call(|| self.session.execute_tool(&self.remote_name, arguments))
            .await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
