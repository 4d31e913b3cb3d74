//! OpenAI-compatible inference client.
//!
//! Implements [`ReasoningModel`] over a non-streaming Chat Completions call:
//! the provider-neutral history is rendered into wire messages, the tool
//! catalog into function definitions, and the reply back into a
//! [`ModelResponse`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use crate::mcp_client::ToolDescriptor;

use super::config::ModelConfig;
use super::errors::InferenceError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentBlock, FunctionCallResponse,
    FunctionDefinition, Message, ModelResponse, Role, StopReason, ToolCallResponse, ToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── ReasoningModel ──────────────────────────────────────────────────────────

/// The decision-making service driving the conversation loop.
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    /// Produce the next turn given the system instructions, the history so
    /// far, and the tools the model may request.
    async fn invoke(
        &self,
        system: &str,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse, InferenceError>;

    /// Whether the model can currently be reached. Must not consume tokens.
    async fn health_check(&self) -> bool {
        true
    }
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible model endpoint.
pub struct InferenceClient {
    http: HttpClient,
    config: ModelConfig,
}

impl InferenceClient {
    /// Create a client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn from_config(config: ModelConfig) -> Result<Self, InferenceError> {
        config.validate()?;

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    /// The base URL of the model endpoint.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// The model requested on every call.
    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    // ─── Chat Completion (non-streaming) ─────────────────────────────────

    /// Send a non-streaming chat completion request.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelResponse, InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let body = ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: self.config.timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion(&body_text)
    }
}

#[async_trait]
impl ReasoningModel for InferenceClient {
    async fn invoke(
        &self,
        system: &str,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ModelResponse, InferenceError> {
        let messages = to_chat_messages(system, history);
        let tools = (!tools.is_empty()).then(|| to_openai_tools(tools));
        tracing::debug!(
            model = %self.model_name(),
            messages = messages.len(),
            tools = tools.as_ref().map_or(0, Vec::len),
            "sending chat completion"
        );
        self.chat_completion(messages, tools).await
    }

    /// Reachable when `GET {base_url}/models` succeeds.
    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url().trim_end_matches('/'));
        let reachable = match self.http.get(&url).timeout(CONNECT_TIMEOUT).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        };
        tracing::debug!(endpoint = %self.base_url(), reachable, "model health check");
        reachable
    }
}

// ─── Conversions ─────────────────────────────────────────────────────────────

/// Render the tool catalog as OpenAI function definitions.
pub fn to_openai_tools(catalog: &[ToolDescriptor]) -> Vec<ToolDefinition> {
    catalog
        .iter()
        .map(|tool| ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
        })
        .collect()
}

/// Render the system instructions and history as wire messages.
///
/// Tool results become one `tool` message each, placed before any text in
/// the same turn so they directly follow the assistant's tool calls.
pub fn to_chat_messages(system: &str, history: &[Message]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage {
        role: Role::System,
        content: Some(system.to_string()),
        tool_call_id: None,
        tool_calls: None,
    }];

    for message in history {
        let mut texts = Vec::new();
        let mut calls = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::Text { text } => texts.push(text.as_str()),
                ContentBlock::ToolUse { id, name, input } => calls.push(ToolCallResponse {
                    id: Some(id.clone()),
                    r#type: "function".to_string(),
                    function: FunctionCallResponse {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                }),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => messages.push(ChatMessage {
                    role: Role::Tool,
                    content: Some(content.clone()),
                    tool_call_id: Some(tool_use_id.clone()),
                    tool_calls: None,
                }),
            }
        }

        if texts.is_empty() && calls.is_empty() {
            continue;
        }
        messages.push(ChatMessage {
            role: message.role,
            content: (!texts.is_empty()).then(|| texts.join("\n")),
            tool_call_id: None,
            tool_calls: (!calls.is_empty()).then_some(calls),
        });
    }

    messages
}

/// Parse a non-streaming completion body.
pub fn parse_completion(body: &str) -> Result<ModelResponse, InferenceError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|c| !c.trim().is_empty()) {
        content.push(ContentBlock::Text { text });
    }

    for call in choice.message.tool_calls.unwrap_or_default() {
        let input = if call.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|e| {
                InferenceError::MalformedResponse {
                    reason: format!(
                        "invalid arguments for tool '{}': {e}",
                        call.function.name
                    ),
                }
            })?
        };
        content.push(ContentBlock::ToolUse {
            id: call.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4())),
            name: call.function.name,
            input,
        });
    }

    let message = Message {
        role: Role::Assistant,
        content,
    };

    // Some OpenAI-compatible servers report "stop" alongside tool calls.
    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") | None if message.has_tool_use() => StopReason::ToolUse,
        Some(reason) => StopReason::from_finish_reason(reason),
        None => StopReason::EndTurn,
    };

    let output = (!message.content.is_empty()).then_some(message);

    Ok(ModelResponse {
        output,
        stop_reason,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::inference::types::ToolResultStatus;

    #[test]
    fn test_parse_text_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"},"finish_reason":"stop"}]}"#;
        let resp = parse_completion(body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
        assert_eq!(resp.output.unwrap(), Message::assistant_text("Hello!"));
    }

    #[test]
    fn test_parse_tool_call_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[
            {"id":"call_abc","type":"function","function":{"name":"URLTitleFetcher","arguments":"{\"url\":\"https://example.com\"}"}}
        ]},"finish_reason":"tool_calls"}]}"#;
        let resp = parse_completion(body).unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        let output = resp.output.unwrap();
        assert_eq!(
            output.content,
            vec![ContentBlock::ToolUse {
                id: "call_abc".into(),
                name: "URLTitleFetcher".into(),
                input: json!({"url": "https://example.com"}),
            }]
        );
    }

    #[test]
    fn test_parse_tool_call_without_id_or_args() {
        let body = r#"{"choices":[{"message":{"tool_calls":[
            {"function":{"name":"RandomWeb","arguments":""}}
        ]},"finish_reason":"stop"}]}"#;
        let resp = parse_completion(body).unwrap();
        // Tool calls reported with "stop" still continue the loop.
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        match &resp.output.unwrap().content[0] {
            ContentBlock::ToolUse { id, input, .. } => {
                assert!(id.starts_with("call_"));
                assert_eq!(input, &json!({}));
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_message_has_no_output() {
        let body = r#"{"choices":[{"message":{"content":""},"finish_reason":"length"}]}"#;
        let resp = parse_completion(body).unwrap();
        assert!(resp.output.is_none());
        assert_eq!(resp.stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        let body = r#"{"choices":[{"message":{"tool_calls":[
            {"id":"c","function":{"name":"RandomWeb","arguments":"{not json"}}
        ]}}]}"#;
        let err = parse_completion(body).unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse { .. }));
    }

    #[test]
    fn test_parse_rejects_empty_choices() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.to_string().contains("empty choices"));
    }

    #[test]
    fn test_to_chat_messages_round_trip_shape() {
        let history = vec![
            Message::user_text("Get me a random site title"),
            Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "RandomWeb".into(),
                    input: json!({}),
                }],
            },
            Message {
                role: Role::User,
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".into(),
                    content: "https://example.com".into(),
                    status: ToolResultStatus::Success,
                }],
            },
        ];

        let messages = to_chat_messages("be brief", &history);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content.as_deref(), Some("Get me a random site title"));

        let calls = messages[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "RandomWeb");
        assert_eq!(calls[0].function.arguments, "{}");
        assert!(messages[2].content.is_none());

        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_to_openai_tools() {
        let catalog = vec![ToolDescriptor {
            name: "URLTitleFetcher".into(),
            description: "Fetch only the title from a URL".into(),
            input_schema: json!({"type": "object", "required": ["url"]}),
        }];
        let tools = to_openai_tools(&catalog);
        assert_eq!(tools[0].r#type, "function");
        assert_eq!(tools[0].function.parameters["required"][0], "url");
    }

    #[test]
    fn test_from_config_validates() {
        let config = ModelConfig {
            model_name: String::new(),
            ..ModelConfig::default()
        };
        assert!(InferenceClient::from_config(config).is_err());

        let client = InferenceClient::from_config(ModelConfig::default()).unwrap();
        assert_eq!(client.model_name(), "qwen2.5:7b");
        assert_eq!(client.base_url(), "http://localhost:11434/v1");
    }

    #[tokio::test]
    async fn test_health_check_unreachable_endpoint() {
        let client = InferenceClient::from_config(ModelConfig {
            base_url: "http://127.0.0.1:1/v1".into(),
            ..ModelConfig::default()
        })
        .unwrap();
        assert!(!client.health_check().await);
    }
}
