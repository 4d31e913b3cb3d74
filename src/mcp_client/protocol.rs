//! MCP protocol session on top of a [`Transport`].
//!
//! Owns the handshake and the typed `tools/list` / `tools/call` exchanges.
//! Releasing it is separate from releasing the transport it runs over.
//!
//! The close notice ([`SHUTDOWN_NOTICE`]) is not an MCP method. MCP ends a
//! session by closing the transport; the notice is an extra courtesy that
//! servers without a handler drop as an unknown notification. Failing to
//! deliver it never blocks the transport release.

use std::sync::Arc;

use super::errors::McpError;
use super::transport::{extract_result, Transport};
use super::types::{InitializeResult, ListToolsResult, ToolDescriptor, ToolOutput, PROTOCOL_VERSION};

/// Notification sent when the protocol session is released.
pub const SHUTDOWN_NOTICE: &str = "shutdown";

pub struct RpcSession {
    server_name: String,
    transport: Arc<dyn Transport>,
}

impl RpcSession {
    pub fn new(server_name: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            server_name: server_name.to_string(),
            transport,
        }
    }

    /// Perform the MCP initialization handshake.
    ///
    /// Sends `initialize`, then `notifications/initialized` once the server
    /// has answered.
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let response = self.transport.request("initialize", Some(params)).await?;
        let result = extract_result(response)?;

        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
                server: self.server_name.clone(),
                reason: format!("failed to parse initialize response: {e}"),
            })?;

        self.transport
            .notify("notifications/initialized", None)
            .await?;

        tracing::debug!(
            server = %self.server_name,
            protocol = ?init.protocol_version,
            "handshake complete"
        );
        Ok(init)
    }

    /// Fetch the server's tool catalog.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let response = self.transport.request("tools/list", None).await?;
        let result = extract_result(response)?;
        let list: ListToolsResult =
            serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
                server: self.server_name.clone(),
                reason: format!("failed to parse tools/list response: {e}"),
            })?;
        Ok(list.tools)
    }

    /// Invoke one tool and return its raw output.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let response = self.transport.request("tools/call", Some(params)).await?;
        let result = extract_result(response)?;
        serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
            server: self.server_name.clone(),
            reason: format!("failed to parse tools/call response: {e}"),
        })
    }

    /// Tell the server this session is over. Best effort: a failed notice
    /// is logged and otherwise ignored.
    pub async fn close(&self) {
        if let Err(e) = self.transport.notify(SHUTDOWN_NOTICE, None).await {
            tracing::debug!(server = %self.server_name, error = %e, "shutdown notice not delivered");
        }
    }
}
