//! Catalog search tool feeding the retrieval execution path.
//!
//! Evaluation-style queries go through the high-accuracy rerank pipeline;
//! everything else uses plain fusion. Retrieved passages are formatted
//! into one context block for the generation prompt.

use serde_json::json;

use super::ToolSpec;
use crate::core::errors::ApiError;
use crate::retrieval::{HybridRetriever, RankedResult, Reranker};

/// Keywords that select the slower, higher-accuracy rerank pipeline.
const RERANK_KEYWORDS: [&str; 8] = [
    "so sánh",
    "đánh giá",
    "nên mua",
    "khác biệt",
    "tốt hơn",
    "ưu điểm",
    "nhược điểm",
    "phân tích",
];

pub const NO_RESULTS_MESSAGE: &str =
    "Không tìm thấy thông tin sản phẩm nào phù hợp với câu hỏi của bạn.";

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "product_search",
        description: "Answer questions about phone products, their specifications, \
                      prices, comparisons, or reviews. The input is the user's question.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "The user's question" }
            },
            "required": ["query"]
        }),
    }
}

pub struct SearchOutcome {
    pub results: Vec<RankedResult>,
    pub context: String,
}

pub fn should_rerank(query: &str) -> bool {
    let lowered = query.to_lowercase();
    RERANK_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

pub async fn run(
    retriever: &HybridRetriever,
    reranker: &Reranker,
    query: &str,
    top_k: usize,
) -> Result<SearchOutcome, ApiError> {
    let results = if should_rerank(query) {
        tracing::info!("Product search: high-accuracy mode for query: {}", query);
        let candidates = retriever.fuse(query, top_k).await?;
        reranker.rerank(query, candidates, top_k).await?
    } else {
        tracing::info!("Product search: fast mode for query: {}", query);
        retriever.fuse(query, top_k).await?
    };

    let context = format_context(&results);
    Ok(SearchOutcome { results, context })
}

pub fn format_context(results: &[RankedResult]) -> String {
    if results.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
    }

    results
        .iter()
        .map(|r| {
            format!(
                "Nguồn: {}\nURL: {}\nNội dung: {}",
                r.passage.metadata.title, r.passage.metadata.url, r.passage.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::passage::{test_passage, RankSource};

    #[test]
    fn rerank_keywords_are_matched_case_insensitively() {
        assert!(should_rerank("So Sánh iPhone 16 và Galaxy S24"));
        assert!(should_rerank("máy nào tốt hơn?"));
        assert!(!should_rerank("giá iphone 16"));
    }

    #[test]
    fn context_formats_source_url_and_content() {
        let results = vec![RankedResult {
            passage: test_passage("p1", "iphone-16", "Màn hình 6.1 inch"),
            score: 1.0,
            source: RankSource::Fused,
        }];

        let context = format_context(&results);
        assert!(context.contains("Nguồn: title-iphone-16"));
        assert!(context.contains("URL: https://shop.example/iphone-16"));
        assert!(context.contains("Nội dung: Màn hình 6.1 inch"));
    }

    #[test]
    fn empty_results_yield_no_info_message() {
        assert_eq!(format_context(&[]), NO_RESULTS_MESSAGE);
    }
}
