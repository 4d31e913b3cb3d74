//! Per-run conversation state.
//!
//! Two parallel records grow together during one run: the model-facing
//! history (role + content blocks) and the human-facing transcript. Both
//! only ever grow, and both are dropped when the run ends.

use crate::inference::types::{ContentBlock, Message, Role};

use super::types::TranscriptEntry;

#[derive(Debug, Clone)]
pub struct ConversationState {
    history: Vec<Message>,
    transcript: Vec<TranscriptEntry>,
}

impl ConversationState {
    /// Start a run from the caller's message.
    pub fn new(user_message: &str) -> Self {
        Self {
            history: vec![Message::user_text(user_message)],
            transcript: vec![TranscriptEntry::user(user_message)],
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Append a raw model output to the history.
    pub fn add_model_output(&mut self, output: Message) {
        self.history.push(output);
    }

    /// Append the correlated tool results of one turn to the history.
    pub fn add_tool_results(&mut self, results: Vec<ContentBlock>) {
        if results.is_empty() {
            return;
        }
        self.history.push(Message {
            role: Role::User,
            content: results,
        });
    }

    /// Append to the transcript only.
    pub fn record(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }

    pub fn into_transcript(self) -> Vec<TranscriptEntry> {
        self.transcript
    }
}
