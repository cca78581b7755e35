use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::gemini::GeminiProvider;
use super::ollama::OllamaProvider;
use super::types::ChatRequest;
use crate::core::config::{ProviderConfig, ProviderKind};
use crate::core::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "ollama", "gemini")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// chat completion (streaming)
    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError>;

    /// generate embeddings for a batch of inputs
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}

/// Construct the configured provider. Backend selection happens exactly once,
/// here; everything downstream holds the trait object.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, ApiError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    match config.kind {
        ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(
            config.base_url.clone(),
            config.model.clone(),
            config.embedding_model.clone(),
            timeout,
        )?)),
        ProviderKind::Gemini => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ApiError::BadRequest("provider.api_key is required for gemini".to_string())
            })?;
            Ok(Arc::new(GeminiProvider::new(
                api_key,
                config.model.clone(),
                config.embedding_model.clone(),
                timeout,
            )?))
        }
    }
}
