use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::errors::ApiError;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: String,
    model: String,
    embedding_model: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: String,
        embedding_model: String,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            api_key,
            model,
            embedding_model,
            client,
        })
    }

    /// Gemini takes one content blob per request here; roles are flattened
    /// into a single prompt in message order.
    fn flatten_messages(request: &ChatRequest) -> String {
        request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn request_body(request: &ChatRequest) -> Value {
        let mut body = json!({
            "contents": [{
                "parts": [{ "text": Self::flatten_messages(request) }]
            }]
        });
        let mut generation_config = serde_json::Map::new();
        if let Some(t) = request.temperature {
            generation_config.insert("temperature".to_string(), json!(t));
        }
        if let Some(t) = request.top_p {
            generation_config.insert("topP".to_string(), json!(t));
        }
        if let Some(t) = request.max_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(t));
        }
        if !generation_config.is_empty() {
            if let Some(obj) = body.as_object_mut() {
                obj.insert(
                    "generationConfig".to_string(),
                    Value::Object(generation_config),
                );
            }
        }
        body
    }

    fn map_request_error(err: reqwest::Error) -> ApiError {
        if err.is_timeout() || err.is_connect() {
            ApiError::unavailable(err)
        } else {
            ApiError::internal(err)
        }
    }

    async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let text = res.text().await.unwrap_or_default();
        if status.as_u16() == 503 || text.contains("UNAVAILABLE") {
            Err(ApiError::ServiceUnavailable(text))
        } else {
            Err(ApiError::Internal(format!(
                "gemini returned {}: {}",
                status, text
            )))
        }
    }

    fn extract_text(payload: &Value) -> Option<String> {
        payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/models?key={}", API_BASE, self.api_key);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        );

        let res = self
            .client
            .post(&url)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let res = Self::check_status(res).await?;

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        Ok(Self::extract_text(&payload).unwrap_or_default())
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            API_BASE, self.model, self.api_key
        );

        let res = self
            .client
            .post(&url)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let res = Self::check_status(res).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(bytes) => {
                        let chunk_str = String::from_utf8_lossy(&bytes);
                        for line in chunk_str.lines() {
                            let line = line.trim();
                            let Some(data) = line.strip_prefix("data: ") else {
                                continue;
                            };
                            let Ok(payload) = serde_json::from_str::<Value>(data) else {
                                continue;
                            };
                            if let Some(text) = GeminiProvider::extract_text(&payload) {
                                if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            API_BASE, self.embedding_model, self.api_key
        );

        let requests: Vec<Value> = inputs
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.embedding_model),
                    "content": { "parts": [{ "text": text }] }
                })
            })
            .collect();

        let res = self
            .client
            .post(&url)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(Self::map_request_error)?;
        let res = Self::check_status(res).await?;

        let payload: Value = res.json().await.map_err(ApiError::internal)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["embeddings"].as_array() {
            for item in data {
                if let Some(vals) = item["values"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        Ok(embeddings)
    }
}
