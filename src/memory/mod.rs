//! Per-thread conversation memory with summarization-based compaction.
//!
//! Each thread keeps an append-only message log until the stored history
//! (excluding the in-flight user message) reaches the summary threshold.
//! Crossing the threshold summarizes the entire prior history into one
//! message and replaces the log with exactly `[summary, user, response]`.
//!
//! Turns are two-phase: `begin_turn` assembles the generation history (and
//! performs summarization when due), the caller generates the reply, and
//! `complete_turn` commits the outcome. Callers must not run overlapping
//! turns on the same thread.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, LlmService};

const SUMMARY_PROMPT: &str = "Distill the above chat messages into a single \
summary message. Include as many specific details as you can.";

#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

impl StoredMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: role.to_string(),
            content: content.into(),
        }
    }

    fn as_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.clone(),
            content: self.content.clone(),
        }
    }
}

/// Assembled state for one in-flight turn.
pub struct PreparedTurn {
    /// Messages to hand to the generation model, system prompt first.
    pub messages: Vec<ChatMessage>,
    user_message: StoredMessage,
    /// Present when this turn crossed the summary threshold.
    summary: Option<StoredMessage>,
}

impl PreparedTurn {
    pub fn compacting(&self) -> bool {
        self.summary.is_some()
    }
}

pub struct ConversationMemory {
    llm: LlmService,
    summary_threshold: usize,
    threads: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl ConversationMemory {
    pub fn new(llm: LlmService, summary_threshold: usize) -> Self {
        Self {
            llm,
            summary_threshold: summary_threshold.max(1),
            threads: Mutex::new(HashMap::new()),
        }
    }

    /// Assemble the generation history for a new user turn.
    ///
    /// Below the threshold this is `[system] + stored history + [user]`.
    /// At or above it, the stored history is summarized through the model
    /// and the turn proceeds over `[system, summary, user]`.
    pub async fn begin_turn(
        &self,
        thread_id: &str,
        user_content: &str,
        system_prompt: &str,
    ) -> Result<PreparedTurn, ApiError> {
        let history = {
            let threads = self.threads.lock().await;
            threads.get(thread_id).cloned().unwrap_or_default()
        };

        let user_message = StoredMessage::new("user", user_content);
        let system = ChatMessage::system(system_prompt);

        if history.len() >= self.summary_threshold {
            tracing::info!(
                "Compacting thread {} ({} stored messages)",
                thread_id,
                history.len()
            );

            let mut summary_request: Vec<ChatMessage> =
                history.iter().map(StoredMessage::as_chat_message).collect();
            summary_request.push(ChatMessage::user(SUMMARY_PROMPT));
            let summary_content = self.llm.invoke(summary_request).await?;
            let summary = StoredMessage::new("assistant", summary_content);

            let messages = vec![
                system,
                summary.as_chat_message(),
                user_message.as_chat_message(),
            ];
            return Ok(PreparedTurn {
                messages,
                user_message,
                summary: Some(summary),
            });
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system);
        messages.extend(history.iter().map(StoredMessage::as_chat_message));
        messages.push(user_message.as_chat_message());

        Ok(PreparedTurn {
            messages,
            user_message,
            summary: None,
        })
    }

    /// Commit a finished turn. A compacting turn discards every previously
    /// stored message and leaves exactly `[summary, user, response]`.
    pub async fn complete_turn(
        &self,
        thread_id: &str,
        prepared: PreparedTurn,
        response_content: &str,
    ) {
        let response = StoredMessage::new("assistant", response_content);
        let mut threads = self.threads.lock().await;
        let history = threads.entry(thread_id.to_string()).or_default();

        match prepared.summary {
            Some(summary) => {
                *history = vec![summary, prepared.user_message, response];
            }
            None => {
                history.push(prepared.user_message);
                history.push(response);
            }
        }
    }

    pub async fn history(&self, thread_id: &str) -> Option<Vec<StoredMessage>> {
        let threads = self.threads.lock().await;
        threads.get(thread_id).cloned()
    }

    pub async fn message_count(&self, thread_id: &str) -> usize {
        let threads = self.threads.lock().await;
        threads.get(thread_id).map(|h| h.len()).unwrap_or(0)
    }
}
