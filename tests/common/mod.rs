//! Shared fixtures: in-process tool servers and a scripted reasoning model.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use toolmesh::inference::types::{ContentBlock, Message, ModelResponse, Role, StopReason};
use toolmesh::inference::{InferenceError, ReasoningModel};
use toolmesh::mcp_client::local::{LocalConnector, LocalToolServer};
use toolmesh::mcp_client::{ServerConfig, ToolDescriptor};

pub const RANDOM_SITE: &str = "https://www.rust-lang.org";
pub const RANDOM_SITE_TITLE: &str = "Rust Programming Language";

pub const FETCHER_URL: &str = "local://url-fetcher";
pub const RANDOM_WEB_URL: &str = "local://random-web";

/// Serves `URLTitleFetcher`.
pub fn url_fetcher() -> Arc<LocalToolServer> {
    Arc::new(LocalToolServer::new("url-fetcher").tool(
        ToolDescriptor {
            name: "URLTitleFetcher".into(),
            description: "Fetch only the title from a URL".into(),
            input_schema: json!({
                "type": "object",
                "required": ["url"],
                "properties": {"url": {"type": "string", "description": "URL to fetch title from"}},
            }),
        },
        |args| match args.get("url").and_then(Value::as_str) {
            Some(RANDOM_SITE) => Ok(RANDOM_SITE_TITLE.to_string()),
            Some(url) => Err(format!("failed to fetch {url}")),
            None => Err("missing url".to_string()),
        },
    ))
}

/// Serves `RandomWeb`.
pub fn random_web() -> Arc<LocalToolServer> {
    Arc::new(LocalToolServer::new("random-web").tool(
        ToolDescriptor {
            name: "RandomWeb".into(),
            description: "Return a random web URL".into(),
            input_schema: json!({"type": "object", "required": [], "properties": {}}),
        },
        |_| Ok(RANDOM_SITE.to_string()),
    ))
}

pub fn server_configs() -> Vec<ServerConfig> {
    vec![
        ServerConfig {
            name: "url-fetcher".into(),
            url: FETCHER_URL.into(),
        },
        ServerConfig {
            name: "random-web".into(),
            url: RANDOM_WEB_URL.into(),
        },
    ]
}

pub fn connector(fetcher: &Arc<LocalToolServer>, web: &Arc<LocalToolServer>) -> Arc<LocalConnector> {
    Arc::new(
        LocalConnector::new()
            .with_server(FETCHER_URL, Arc::clone(fetcher))
            .with_server(RANDOM_WEB_URL, Arc::clone(web)),
    )
}

// ─── Scripted model ─────────────────────────────────────────────────────────

/// Replays queued responses and records what it was shown.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ModelResponse, InferenceError>>>,
    seen_tools: Mutex<Vec<Vec<String>>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<ModelResponse, InferenceError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            seen_tools: Mutex::new(Vec::new()),
        })
    }

    /// Number of model calls made so far.
    pub fn calls(&self) -> usize {
        self.seen_tools.lock().unwrap().len()
    }

    /// Tool names offered on each call.
    pub fn seen_tools(&self) -> Vec<Vec<String>> {
        self.seen_tools.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningModel for ScriptedModel {
    async fn invoke(
        &self,
        _system: &str,
        _history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse, InferenceError> {
        self.seen_tools
            .lock()
            .unwrap()
            .push(tools.iter().map(|t| t.name.clone()).collect());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(text("done")))
    }
}

pub fn text(t: &str) -> ModelResponse {
    ModelResponse {
        output: Some(Message::assistant_text(t)),
        stop_reason: StopReason::EndTurn,
    }
}

pub fn tool_request(id: &str, name: &str, input: Value) -> ModelResponse {
    ModelResponse {
        output: Some(Message {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            }],
        }),
        stop_reason: StopReason::ToolUse,
    }
}

/// RandomWeb, then URLTitleFetcher on its output, then a final answer.
pub fn random_site_title_script() -> Vec<Result<ModelResponse, InferenceError>> {
    vec![
        Ok(tool_request("call_1", "RandomWeb", json!({}))),
        Ok(tool_request("call_2", "URLTitleFetcher", json!({"url": RANDOM_SITE}))),
        Ok(text(&format!("The random site is titled \"{RANDOM_SITE_TITLE}\"."))),
    ]
}
