//! Cross-encoder reranking over fused candidates.
//!
//! All `(query, passage)` pairs are scored in one batched call with the
//! passage text truncated to a configured bound. Passages sharing a
//! product keep only their best score, and the surviving products are
//! ranked by that score with ties broken by fusion order. A second cache
//! layer, tagged `rerank`, sits in front of the whole stage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::cache::QueryCache;
use super::passage::{RankSource, RankedResult};
use crate::core::config::{RerankConfig, RerankMode};
use crate::core::errors::ApiError;
use crate::llm::LlmService;

const RERANK_STAGE: &str = "rerank";

#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Relevance scores for `(query, passage)` pairs, one per passage, in
    /// input order.
    async fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, ApiError>;
}

/// Cross-encoder backed by the provider's embedding model: query and
/// passages are embedded in a single batch and scored by cosine
/// similarity. The scoring math runs on the blocking pool so it never
/// stalls concurrent request handling.
pub struct EmbeddingCrossEncoder {
    llm: LlmService,
}

impl EmbeddingCrossEncoder {
    pub fn new(llm: LlmService) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CrossEncoder for EmbeddingCrossEncoder {
    async fn score_pairs(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, ApiError> {
        let mut inputs = Vec::with_capacity(passages.len() + 1);
        inputs.push(query.to_string());
        inputs.extend_from_slice(passages);

        let embeddings = self.llm.embed(&inputs).await?;
        if embeddings.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "embedding count mismatch: {} != {}",
                embeddings.len(),
                inputs.len()
            )));
        }

        let scores = tokio::task::spawn_blocking(move || {
            let query_embedding = &embeddings[0];
            embeddings[1..]
                .iter()
                .map(|candidate| cosine_similarity(query_embedding, candidate))
                .collect::<Vec<f32>>()
        })
        .await
        .map_err(ApiError::internal)?;

        Ok(scores)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Selection policy applied after per-product aggregation.
#[derive(Debug, Clone, Copy)]
pub enum RerankPolicy {
    /// Keep the best `top_k` products.
    TopK,
    /// Legacy mode: keep every product scoring above the threshold.
    Threshold(f32),
}

impl RerankPolicy {
    pub fn from_config(config: &RerankConfig) -> Self {
        match config.mode {
            RerankMode::TopK => RerankPolicy::TopK,
            RerankMode::Threshold => RerankPolicy::Threshold(config.score_threshold),
        }
    }
}

pub struct Reranker {
    encoder: Arc<dyn CrossEncoder>,
    cache: Arc<QueryCache>,
    policy: RerankPolicy,
    max_content_chars: usize,
    cache_ttl: Duration,
}

impl Reranker {
    pub fn new(
        encoder: Arc<dyn CrossEncoder>,
        cache: Arc<QueryCache>,
        policy: RerankPolicy,
        max_content_chars: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            encoder,
            cache,
            policy,
            max_content_chars,
            cache_ttl,
        }
    }

    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RankedResult>,
        top_k: usize,
    ) -> Result<Vec<RankedResult>, ApiError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let key = QueryCache::key(query, top_k, Some(RERANK_STAGE));
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Rerank cache hit for query: {}", query);
            return Ok(hit);
        }

        let texts: Vec<String> = candidates
            .iter()
            .map(|c| truncate_chars(&c.passage.content, self.max_content_chars))
            .collect();
        let scores = self.encoder.score_pairs(query, &texts).await?;
        if scores.len() != candidates.len() {
            return Err(ApiError::Internal(format!(
                "reranker returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            )));
        }

        let reranked = aggregate_best_per_product(candidates, &scores, self.policy, top_k);

        if let Err(err) = self.cache.set(&key, &reranked, self.cache_ttl).await {
            tracing::warn!("Failed to cache rerank result: {}", err);
        }

        Ok(reranked)
    }
}

/// Best evidence per product: among passages sharing a product, only the
/// maximum-scoring one survives. Products are then ordered by that score,
/// descending, ties keeping the candidate (fusion) order.
fn aggregate_best_per_product(
    candidates: Vec<RankedResult>,
    scores: &[f32],
    policy: RerankPolicy,
    top_k: usize,
) -> Vec<RankedResult> {
    let mut order: Vec<RankedResult> = Vec::new();
    let mut by_product: HashMap<String, usize> = HashMap::new();

    for (candidate, &score) in candidates.into_iter().zip(scores) {
        let product_id = candidate.passage.metadata.product_id.clone();
        match by_product.get(&product_id).copied() {
            Some(idx) => {
                if score > order[idx].score {
                    order[idx] = RankedResult {
                        passage: candidate.passage,
                        score,
                        source: RankSource::Reranked,
                    };
                }
            }
            None => {
                by_product.insert(product_id, order.len());
                order.push(RankedResult {
                    passage: candidate.passage,
                    score,
                    source: RankSource::Reranked,
                });
            }
        }
    }

    order.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    match policy {
        RerankPolicy::TopK => order.truncate(top_k),
        RerankPolicy::Threshold(threshold) => order.retain(|r| r.score > threshold),
    }

    order
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
