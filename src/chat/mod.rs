//! Turn pipeline: route, retrieve, assemble context, remember, generate.
//!
//! Stages within one turn are strictly sequential; events are pushed to
//! the transport as they happen so the reply streams incrementally.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::llm::{ChatRequest, LlmService};
use crate::memory::ConversationMemory;
use crate::retrieval::{HybridRetriever, Reranker};
use crate::router::{IntentRouter, RouterDecision};
use crate::tools::{comparison, product_search};

const CHAT_SYSTEM_PROMPT: &str = "Bạn là một nhân viên tư vấn điện thoại nhiệt tình. \
Hãy trả lời người dùng một cách lịch sự, tên bạn là Lisa, luôn trả lời là Lisa thay vì tôi.";

fn retrieval_system_prompt(context: &str) -> String {
    format!(
        "Bạn là một nhân viên tư vấn của shop điện thoại.\n\
         Nhiệm vụ:\n\
         - Hãy trả lời một cách thân thiện, minh bạch.\n\
         - Luôn giữ văn phong lịch sự, chuyên nghiệp, không dùng ngôn ngữ lập lờ hay viết hoa toàn bộ.\n\
         - Dựa vào thông tin có sẵn, hãy trả lời chi tiết cho người dùng dễ hiểu, \
         tiếp cận thông tin như sau: {}",
        context
    )
}

fn comparison_system_prompt(table: &str) -> String {
    format!(
        "Bạn là một nhân viên tư vấn của shop điện thoại.\n\
         Người dùng muốn so sánh sản phẩm. Dưới đây là bảng so sánh đã tổng hợp, \
         hãy trình bày lại thân thiện và nêu điểm khác biệt chính:\n{}",
        table
    )
}

/// Events emitted while processing one turn, in order: the thread control
/// line, an optional retrieval/comparison info line, reply chunks, then
/// either `Done` or `Error`.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    ThreadId(String),
    RetrievalInfo(usize),
    ComparisonInfo(usize),
    Chunk(String),
    Error(String),
    Done,
}

pub struct ChatPipeline {
    router: Arc<IntentRouter>,
    retriever: Arc<HybridRetriever>,
    reranker: Arc<Reranker>,
    memory: Arc<ConversationMemory>,
    llm: LlmService,
    top_k: usize,
    compare_k: usize,
}

impl ChatPipeline {
    pub fn new(
        router: Arc<IntentRouter>,
        retriever: Arc<HybridRetriever>,
        reranker: Arc<Reranker>,
        memory: Arc<ConversationMemory>,
        llm: LlmService,
        top_k: usize,
        compare_k: usize,
    ) -> Self {
        Self {
            router,
            retriever,
            reranker,
            memory,
            llm,
            top_k,
            compare_k,
        }
    }

    /// Process one user turn, pushing events to the transport as the reply
    /// streams. Failures surface as an `Error` event; the turn is only
    /// committed to memory after the full reply has been generated.
    pub async fn run_turn(&self, thread_id: &str, message: &str, events: mpsc::Sender<TurnEvent>) {
        let _ = events
            .send(TurnEvent::ThreadId(thread_id.to_string()))
            .await;

        let decision = self.router.classify(message).await;
        let system_prompt = self.build_context(&decision, &events).await;

        let prepared = match self
            .memory
            .begin_turn(thread_id, message, &system_prompt)
            .await
        {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::error!("Failed to assemble history for {}: {}", thread_id, err);
                let _ = events.send(TurnEvent::Error(err.to_string())).await;
                return;
            }
        };

        let mut stream = match self
            .llm
            .stream_chat(ChatRequest::new(prepared.messages.clone()))
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!("Generation failed for {}: {}", thread_id, err);
                let _ = events.send(TurnEvent::Error(err.to_string())).await;
                return;
            }
        };

        let mut full_response = String::new();
        while let Some(chunk) = stream.recv().await {
            match chunk {
                Ok(chunk) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    full_response.push_str(&chunk);
                    let _ = events.send(TurnEvent::Chunk(chunk)).await;
                }
                Err(err) => {
                    tracing::error!("Stream failed for {}: {}", thread_id, err);
                    let _ = events.send(TurnEvent::Error(err.to_string())).await;
                    return;
                }
            }
        }

        self.memory
            .complete_turn(thread_id, prepared, &full_response)
            .await;
        let _ = events.send(TurnEvent::Done).await;
    }

    /// Resolve the decision into the system prompt for this turn, emitting
    /// the matching info event. Retrieval failures degrade to the no-info
    /// context instead of failing the turn.
    async fn build_context(
        &self,
        decision: &RouterDecision,
        events: &mpsc::Sender<TurnEvent>,
    ) -> String {
        match decision {
            RouterDecision::Chat { .. } => CHAT_SYSTEM_PROMPT.to_string(),
            RouterDecision::Retrieval { info } => {
                let context = match product_search::run(
                    &self.retriever,
                    &self.reranker,
                    info,
                    self.top_k,
                )
                .await
                {
                    Ok(outcome) => {
                        let _ = events
                            .send(TurnEvent::RetrievalInfo(outcome.results.len()))
                            .await;
                        outcome.context
                    }
                    Err(err) => {
                        tracing::warn!("Retrieval failed, degrading to no-info: {}", err);
                        let _ = events.send(TurnEvent::RetrievalInfo(0)).await;
                        product_search::NO_RESULTS_MESSAGE.to_string()
                    }
                };
                retrieval_system_prompt(&context)
            }
            RouterDecision::Comparison { products } => {
                let outcome = comparison::run(&self.retriever, products, self.compare_k).await;
                let _ = events
                    .send(TurnEvent::ComparisonInfo(outcome.product_count))
                    .await;
                comparison_system_prompt(&outcome.table)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::testing::scripted_service;
    use crate::retrieval::passage::{test_passage, Passage, RankedResult};
    use crate::retrieval::rerank::{CrossEncoder, RerankPolicy};
    use crate::retrieval::{FusionWeights, LexicalIndex, QueryCache, VectorIndex};

    struct EmptyVector;

    #[async_trait::async_trait]
    impl VectorIndex for EmptyVector {
        async fn similarity_search(
            &self,
            _query: &str,
            _k: usize,
        ) -> Result<Vec<RankedResult>, crate::core::errors::ApiError> {
            Ok(Vec::new())
        }
    }

    struct FlatEncoder;

    #[async_trait::async_trait]
    impl CrossEncoder for FlatEncoder {
        async fn score_pairs(
            &self,
            _query: &str,
            passages: &[String],
        ) -> Result<Vec<f32>, crate::core::errors::ApiError> {
            Ok(vec![1.0; passages.len()])
        }
    }

    async fn pipeline_over(
        passages: Vec<Passage>,
        responses: Vec<&'static str>,
    ) -> ChatPipeline {
        let (llm, _) = scripted_service(responses);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::mem::forget(dir);
        let cache = Arc::new(QueryCache::with_path(path).await.unwrap());

        let retriever = Arc::new(HybridRetriever::new(
            Arc::new(LexicalIndex::build(passages)),
            Arc::new(EmptyVector),
            cache.clone(),
            FusionWeights::default(),
            Duration::from_secs(60),
        ));
        let reranker = Arc::new(Reranker::new(
            Arc::new(FlatEncoder),
            cache,
            RerankPolicy::TopK,
            512,
            Duration::from_secs(60),
        ));
        let memory = Arc::new(ConversationMemory::new(llm.clone(), 10));
        let router = Arc::new(IntentRouter::new(llm.clone(), 2));

        ChatPipeline::new(router, retriever, reranker, memory, llm, 3, 3)
    }

    async fn collect_events(pipeline: &ChatPipeline, thread: &str, message: &str) -> Vec<TurnEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        pipeline.run_turn(thread, message, tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn chat_turn_streams_reply_and_commits_memory() {
        // Fast path handles routing, so the only model call is generation.
        let pipeline = pipeline_over(Vec::new(), vec!["Chào anh, Lisa đây!"]).await;

        let events = collect_events(&pipeline, "t1", "chào bạn").await;

        assert!(matches!(&events[0], TurnEvent::ThreadId(id) if id == "t1"));
        let reply: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Chunk(chunk) => Some(chunk.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(reply, "Chào anh, Lisa đây!");
        assert!(matches!(events.last(), Some(TurnEvent::Done)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, TurnEvent::RetrievalInfo(_))));

        assert_eq!(pipeline.memory.message_count("t1").await, 2);
    }

    #[tokio::test]
    async fn retrieval_turn_emits_info_line_with_result_count() {
        let pipeline = pipeline_over(
            vec![test_passage("p1", "iphone-16", "iPhone 16 chip A18 giá 25 triệu")],
            vec![
                r#"{"router":"retrieval","infor":"iphone 16"}"#,
                "iPhone 16 đang có giá 25 triệu ạ.",
            ],
        )
        .await;

        let events = collect_events(&pipeline, "t1", "giá iphone 16?").await;

        assert!(events
            .iter()
            .any(|e| matches!(e, TurnEvent::RetrievalInfo(1))));
        assert!(matches!(events.last(), Some(TurnEvent::Done)));
    }

    #[tokio::test]
    async fn comparison_turn_emits_product_count() {
        let pipeline = pipeline_over(
            vec![
                test_passage("p1", "iphone-16", "iPhone 16 chip A18"),
                test_passage("p2", "galaxy-s24", "Galaxy S24 Snapdragon"),
            ],
            vec![
                r#"{"router":"comparison","products":["iphone 16","galaxy s24"]}"#,
                "Hai máy đều rất tốt ạ.",
            ],
        )
        .await;

        let events = collect_events(&pipeline, "t1", "so sánh iphone 16 và galaxy s24").await;

        assert!(events
            .iter()
            .any(|e| matches!(e, TurnEvent::ComparisonInfo(2))));
        assert!(matches!(events.last(), Some(TurnEvent::Done)));
    }
}
