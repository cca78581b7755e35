//! Hybrid retrieval pipeline: lexical + vector indexes, weighted fusion,
//! TTL-cached results and cross-encoder reranking.

pub mod cache;
pub mod fusion;
pub mod lexical;
pub mod passage;
pub mod rerank;
pub mod vector;

pub use cache::QueryCache;
pub use fusion::{FusionWeights, HybridRetriever};
pub use lexical::LexicalIndex;
pub use passage::{Passage, PassageMetadata, RankSource, RankedResult};
pub use rerank::{CrossEncoder, EmbeddingCrossEncoder, RerankPolicy, Reranker};
pub use vector::{SqliteVectorStore, VectorIndex};
