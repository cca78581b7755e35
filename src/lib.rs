//! Conversational product-consultant backend.
//!
//! Hybrid retrieval (lexical + vector) with weighted fusion, TTL-cached
//! results, cross-encoder reranking, LLM-based intent routing and
//! per-thread conversation memory with summarization-based compaction.

pub mod chat;
pub mod core;
pub mod llm;
pub mod memory;
pub mod retrieval;
pub mod router;
pub mod server;
pub mod state;
pub mod tools;
