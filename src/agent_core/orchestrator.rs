//! OrchestrationEngine: the multi-turn model ↔ tool loop.
//!
//! One bounded conversation per incoming message:
//! 1. **Catalog**: collect every registered tool, registering servers lazily
//! 2. **Turn**: send system instructions, history and catalog to the model
//! 3. **Dispatch**: run requested tools in order, folding results back
//! 4. **Stop**: when the model stops asking for tools, or the turn limit hits
//!
//! Tool failures stay inside the conversation. An open circuit ends the run
//! with an error for the caller; any other failure ends it with a single
//! assistant entry describing the error.

use std::sync::Arc;

use crate::inference::types::{ContentBlock, Message, ModelResponse, StopReason};
use crate::inference::ReasoningModel;
use crate::mcp_client::{McpClient, ToolDescriptor};
use crate::resilience::CircuitBreaker;

use super::conversation::ConversationState;
use super::errors::AgentError;
use super::tool_router::{PendingCall, ToolRouter};
use super::types::TranscriptEntry;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Maximum model turns per run.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// Reply when no server contributed any tool.
pub const NO_TOOLS_MESSAGE: &str = "No tools available. Make sure the servers are running.";

/// Default system instructions.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Choose the appropriate tool for the user's question, or reply directly if no tool is needed.
In a single turn, either request tools or answer the user. Do not do both.
When one tool's output is needed as another tool's input (for example a URL returned by \
RandomWeb that should be passed to URLTitleFetcher), pass it on exactly as returned.
When a tool answers, turn its raw output into a short, natural reply that focuses on what \
the user asked. Do not simply repeat the raw data.
Use only the tools declared in this request.";

// ─── OrchestrationEngine ────────────────────────────────────────────────────

pub struct OrchestrationEngine {
    tools: Arc<McpClient>,
    router: ToolRouter,
    model: Arc<dyn ReasoningModel>,
    model_breaker: Option<Arc<CircuitBreaker>>,
    system_prompt: String,
    max_turns: usize,
}

impl OrchestrationEngine {
    pub fn new(tools: Arc<McpClient>, model: Arc<dyn ReasoningModel>) -> Self {
        Self {
            router: ToolRouter::new(Arc::clone(&tools)),
            tools,
            model,
            model_breaker: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Bound the number of model turns (at least one).
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Route every model call through `breaker`.
    pub fn with_model_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.model_breaker = Some(breaker);
        self
    }

    pub fn model_breaker(&self) -> Option<&CircuitBreaker> {
        self.model_breaker.as_deref()
    }

    /// Whether the reasoning model answers a health check.
    pub async fn model_reachable(&self) -> bool {
        self.model.health_check().await
    }

    pub fn tools(&self) -> &Arc<McpClient> {
        &self.tools
    }

    /// Run one conversation for `message` and return its transcript.
    ///
    /// Only a circuit-breaker rejection is returned as `Err`.
    pub async fn process_request(&self, message: &str) -> Result<Vec<TranscriptEntry>, AgentError> {
        match self.run(message).await {
            Ok(transcript) => Ok(transcript),
            Err(e @ AgentError::CircuitOpen(_)) => Err(e),
            Err(e) => {
                tracing::error!(error = %e, "orchestration failed");
                Ok(vec![TranscriptEntry::assistant(format!("Error: {e}"))])
            }
        }
    }

    async fn run(&self, message: &str) -> Result<Vec<TranscriptEntry>, AgentError> {
        let catalog = self.catalog().await;
        if catalog.is_empty() {
            tracing::error!("no tools available from any server");
            return Ok(vec![TranscriptEntry::assistant(NO_TOOLS_MESSAGE)]);
        }
        tracing::info!(
            tools = ?catalog.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "available tools"
        );

        let mut conversation = ConversationState::new(message);

        for turn in 0..self.max_turns {
            tracing::info!(turn, history = conversation.history().len(), "model turn");

            let response = self.invoke_model(conversation.history(), &catalog).await?;
            let Some(output) = response.output else {
                tracing::warn!(turn, "no output message in model response");
                return Ok(conversation.into_transcript());
            };

            let mut results = Vec::new();
            for block in &output.content {
                match block {
                    ContentBlock::Text { text } => {
                        conversation.record(TranscriptEntry::assistant(text.as_str()));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        let call = PendingCall {
                            id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        };
                        results.push(self.router.dispatch(&call, &mut conversation).await?);
                    }
                    ContentBlock::ToolResult { .. } => {}
                }
            }

            let tool_used = output.has_tool_use();
            conversation.add_model_output(output);
            if !tool_used || response.stop_reason != StopReason::ToolUse {
                tracing::info!(turn, stop_reason = ?response.stop_reason, "conversation complete");
                return Ok(conversation.into_transcript());
            }
            conversation.add_tool_results(results);
        }

        tracing::warn!(max_turns = self.max_turns, "turn limit reached");
        conversation.record(TranscriptEntry::assistant(format!(
            "Stopped after {} turns without a final answer.",
            self.max_turns
        )));
        Ok(conversation.into_transcript())
    }

    /// The registered catalog, running the registration phase first if
    /// nothing is registered yet.
    async fn catalog(&self) -> Vec<ToolDescriptor> {
        let catalog = self.tools.catalog().await;
        if !catalog.is_empty() {
            return catalog;
        }

        for (server, e) in self.tools.ensure_started().await {
            tracing::error!(server = %server, error = %e, "failed to initialize server");
        }
        self.tools.catalog().await
    }

    async fn invoke_model(
        &self,
        history: &[Message],
        catalog: &[ToolDescriptor],
    ) -> Result<ModelResponse, AgentError> {
        let invoke = || self.model.invoke(&self.system_prompt, history, catalog);
        let response = match &self.model_breaker {
            Some(breaker) => breaker.call(invoke).await?,
            None => invoke().await?,
        };
        Ok(response)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
