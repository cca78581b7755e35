//! Scripted in-memory provider for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::service::LlmService;
use super::types::ChatRequest;
use crate::core::errors::ApiError;
use crate::core::retry::RetryPolicy;

/// Returns pre-scripted chat responses in order; the last response repeats
/// once the script is exhausted. Embeddings hash tokens into a small fixed
/// dimension so similar texts land near each other.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    pub chat_calls: AtomicUsize,
    pub embed_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            last: Mutex::new(String::new()),
            chat_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        })
    }

    pub fn chat_call_count(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> String {
        let mut queue = self.responses.lock().unwrap();
        match queue.pop_front() {
            Some(response) => {
                *self.last.lock().unwrap() = response.clone();
                response
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, _request: ChatRequest) -> Result<String, ApiError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_response())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let response = self.chat(request).await?;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            // Split into word-sized chunks to exercise stream assembly.
            for word in response.split_inclusive(' ') {
                if tx.send(Ok(word.to_string())).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.iter().map(|text| hash_embedding(text)).collect())
    }
}

/// Deterministic bag-of-tokens embedding: token hash buckets over 16 dims.
pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vec = vec![0.0f32; 16];
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut h: u32 = 2166136261;
        for b in token.bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(16777619);
        }
        vec[(h % 16) as usize] += 1.0;
    }
    vec
}

pub fn scripted_service(responses: Vec<&str>) -> (LlmService, Arc<ScriptedProvider>) {
    let provider = ScriptedProvider::new(responses);
    let service = LlmService::new(
        provider.clone(),
        RetryPolicy::new(1, Duration::from_millis(1)),
    );
    (service, provider)
}
