//! MCP Client: sessions to remote tool servers and the registry over them.
//!
//! This module handles:
//! - JSON-RPC 2.0 messages and the MCP handshake/catalog/call exchanges
//! - Per-server session lifecycle with race-safe teardown
//! - Tool aggregation across servers, with a collision policy
//! - Tool call routing through a per-server circuit breaker
//!
//! The orchestration engine reaches tools only through [`McpClient`].

pub mod client;
pub mod errors;
pub mod local;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{ClientOptions, McpClient};
pub use errors::McpError;
pub use registry::{BreakerSnapshot, CollisionPolicy, Route, ToolRegistry};
pub use session::{SessionState, ToolServerSession};
pub use transport::{Connector, HttpConnector, HttpTransport, Transport};
pub use types::{ServerConfig, ToolDescriptor, ToolOutput};
