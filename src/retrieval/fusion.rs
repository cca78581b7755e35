//! Hybrid fusion over the lexical and vector indexes.
//!
//! Both sources are queried concurrently and joined; fusion then merges the
//! two ranked lists into one product-deduplicated list by weighted score
//! accumulation. Results are cached by `(query, top_k)` for the configured
//! TTL, and a cache hit bypasses the indexes entirely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::cache::QueryCache;
use super::lexical::LexicalIndex;
use super::passage::{RankSource, RankedResult};
use super::vector::VectorIndex;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub lexical: f32,
    pub vector: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            lexical: 0.5,
            vector: 0.5,
        }
    }
}

pub struct HybridRetriever {
    lexical: Arc<LexicalIndex>,
    vector: Arc<dyn VectorIndex>,
    cache: Arc<QueryCache>,
    weights: FusionWeights,
    cache_ttl: Duration,
}

impl HybridRetriever {
    pub fn new(
        lexical: Arc<LexicalIndex>,
        vector: Arc<dyn VectorIndex>,
        cache: Arc<QueryCache>,
        weights: FusionWeights,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            lexical,
            vector,
            cache,
            weights,
            cache_ttl,
        }
    }

    /// Fused top-k products for the query, at most one entry per product.
    pub async fn fuse(&self, query: &str, top_k: usize) -> Result<Vec<RankedResult>, ApiError> {
        let key = QueryCache::key(query, top_k, None);
        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!("Fusion cache hit for query: {}", query);
            return Ok(hit);
        }

        let lexical = self.lexical.clone();
        let owned_query = query.to_string();
        let lexical_task =
            tokio::task::spawn_blocking(move || lexical.search(&owned_query, top_k));

        // Join, not race: both sources must finish before fusion proceeds.
        let (lexical_results, vector_results) =
            tokio::join!(lexical_task, self.vector.similarity_search(query, top_k));
        let lexical_results = lexical_results.map_err(ApiError::internal)?;
        let vector_results = vector_results?;

        let fused = fuse_ranked(lexical_results, vector_results, self.weights, top_k);

        if let Err(err) = self.cache.set(&key, &fused, self.cache_ttl).await {
            tracing::warn!("Failed to cache fusion result: {}", err);
        }

        Ok(fused)
    }
}

/// Merge two source rankings into one product-level ranking.
///
/// Every document contributes its source weight to its product's fused
/// score; a document surfaced by both sources accumulates both weights.
/// The representative passage for a product is the first one observed,
/// processing lexical before vector, and ties keep that first-seen order.
fn fuse_ranked(
    lexical: Vec<RankedResult>,
    vector: Vec<RankedResult>,
    weights: FusionWeights,
    top_k: usize,
) -> Vec<RankedResult> {
    struct FusedEntry {
        result: RankedResult,
        score: f32,
    }

    let mut order: Vec<FusedEntry> = Vec::new();
    let mut by_product: HashMap<String, usize> = HashMap::new();

    let mut accumulate = |results: Vec<RankedResult>, weight: f32| {
        for result in results {
            let product_id = result.passage.metadata.product_id.clone();
            match by_product.get(&product_id).copied() {
                Some(idx) => order[idx].score += weight,
                None => {
                    by_product.insert(product_id, order.len());
                    order.push(FusedEntry {
                        result,
                        score: weight,
                    });
                }
            }
        }
    };

    accumulate(lexical, weights.lexical);
    accumulate(vector, weights.vector);

    // Stable sort keeps first-seen order among equal scores.
    order.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    order.truncate(top_k);

    order
        .into_iter()
        .map(|entry| RankedResult {
            score: entry.score,
            source: RankSource::Fused,
            passage: entry.result.passage,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::retrieval::passage::{test_passage, Passage};

    struct StubVectorIndex {
        passages: Vec<Passage>,
        calls: AtomicUsize,
    }

    impl StubVectorIndex {
        fn new(passages: Vec<Passage>) -> Arc<Self> {
            Arc::new(Self {
                passages,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VectorIndex for StubVectorIndex {
        async fn similarity_search(
            &self,
            _query: &str,
            k: usize,
        ) -> Result<Vec<RankedResult>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .passages
                .iter()
                .take(k)
                .cloned()
                .map(|passage| RankedResult {
                    passage,
                    score: 0.9,
                    source: RankSource::Vector,
                })
                .collect())
        }
    }

    async fn test_cache() -> Arc<QueryCache> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::mem::forget(dir);
        Arc::new(QueryCache::with_path(path).await.unwrap())
    }

    fn ranked(passage: Passage, source: RankSource) -> RankedResult {
        RankedResult {
            passage,
            score: 1.0,
            source,
        }
    }

    #[test]
    fn both_sources_accumulate_both_weights() {
        let shared = test_passage("p1", "iphone-16", "iPhone 16");
        let vector_only = test_passage("p2", "galaxy-s24", "Galaxy S24");

        let fused = fuse_ranked(
            vec![ranked(shared.clone(), RankSource::Lexical)],
            vec![
                ranked(shared, RankSource::Vector),
                ranked(vector_only, RankSource::Vector),
            ],
            FusionWeights {
                lexical: 0.3,
                vector: 0.7,
            },
            10,
        );

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].passage.metadata.product_id, "iphone-16");
        assert!((fused[0].score - 1.0).abs() < 1e-6);
        assert_eq!(fused[1].passage.metadata.product_id, "galaxy-s24");
        assert!((fused[1].score - 0.7).abs() < 1e-6);
        assert!(fused.iter().all(|r| r.source == RankSource::Fused));
    }

    #[test]
    fn output_is_deduplicated_by_product_and_bounded_by_top_k() {
        let lexical: Vec<RankedResult> = (0..4)
            .map(|i| {
                ranked(
                    test_passage(&format!("l{}", i), &format!("prod-{}", i), "content"),
                    RankSource::Lexical,
                )
            })
            .collect();
        // Same products again from the vector side, different passage ids.
        let vector: Vec<RankedResult> = (0..4)
            .map(|i| {
                ranked(
                    test_passage(&format!("v{}", i), &format!("prod-{}", i), "content"),
                    RankSource::Vector,
                )
            })
            .collect();

        let fused = fuse_ranked(lexical, vector, FusionWeights::default(), 3);

        assert_eq!(fused.len(), 3);
        let mut products: Vec<&str> = fused
            .iter()
            .map(|r| r.passage.metadata.product_id.as_str())
            .collect();
        products.dedup();
        assert_eq!(products.len(), 3);
        // Representative passage is the first observed (lexical side).
        assert!(fused.iter().all(|r| r.passage.id.starts_with('l')));
    }

    #[test]
    fn ties_keep_lexical_then_vector_first_seen_order() {
        let fused = fuse_ranked(
            vec![
                ranked(test_passage("l1", "a", "x"), RankSource::Lexical),
                ranked(test_passage("l2", "b", "x"), RankSource::Lexical),
            ],
            vec![ranked(test_passage("v1", "c", "x"), RankSource::Vector)],
            FusionWeights::default(),
            10,
        );

        let products: Vec<&str> = fused
            .iter()
            .map(|r| r.passage.metadata.product_id.as_str())
            .collect();
        assert_eq!(products, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn cache_hit_bypasses_index_queries() {
        let passages = vec![test_passage("p1", "iphone-16", "iPhone 16 chip A18")];
        let vector = StubVectorIndex::new(passages.clone());
        let lexical = Arc::new(LexicalIndex::build(passages));
        let retriever = HybridRetriever::new(
            lexical,
            vector.clone(),
            test_cache().await,
            FusionWeights::default(),
            Duration::from_secs(60),
        );

        let first = retriever.fuse("iphone", 3).await.unwrap();
        assert_eq!(vector.calls.load(Ordering::SeqCst), 1);

        let second = retriever.fuse("iphone", 3).await.unwrap();
        assert_eq!(vector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].passage.id, second[0].passage.id);
    }
}
