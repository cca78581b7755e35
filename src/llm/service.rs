use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::config::ProviderConfig;
use crate::core::errors::ApiError;
use crate::core::retry::{retry_with_backoff, RetryPolicy};
use crate::llm::provider::{build_provider, LlmProvider};
use crate::llm::types::{ChatMessage, ChatRequest};

/// Provider-agnostic LLM access with a bounded retry policy for transient
/// upstream overload (503 / "overloaded" / UNAVAILABLE).
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
}

impl LlmService {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ApiError> {
        let provider = build_provider(config)?;
        let policy = RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        );
        Ok(Self::new(provider, policy))
    }

    pub fn new(provider: Arc<dyn LlmProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn health_check(&self) -> Result<bool, ApiError> {
        self.provider.health_check().await
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        retry_with_backoff(&self.policy, ApiError::is_transient, |_| {
            self.provider.chat(request.clone())
        })
        .await
    }

    /// Convenience wrapper: chat over plain messages with default sampling.
    pub async fn invoke(&self, messages: Vec<ChatMessage>) -> Result<String, ApiError> {
        self.chat(ChatRequest::new(messages)).await
    }

    /// Establishing the stream is retried; once chunks are flowing, errors
    /// pass through to the consumer.
    pub async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        retry_with_backoff(&self.policy, ApiError::is_transient, |_| {
            self.provider.stream_chat(request.clone())
        })
        .await
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        retry_with_backoff(&self.policy, ApiError::is_transient, |_| {
            self.provider.embed(inputs)
        })
        .await
    }
}
