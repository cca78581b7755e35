//! Product comparison tool.
//!
//! Fetches information for every requested product concurrently and
//! renders one markdown comparison table plus the product image URLs.
//! A failed fetch degrades to an error cell for that product only.

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;

use super::ToolSpec;
use crate::retrieval::HybridRetriever;

pub const TOO_FEW_PRODUCTS_MESSAGE: &str =
    "Vui lòng cung cấp ít nhất hai sản phẩm để so sánh.";

pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "compare_products",
        description: "Retrieve information for a list of products and format it \
                      into a markdown comparison table with product images.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "products": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 2,
                    "description": "Product names to compare"
                }
            },
            "required": ["products"]
        }),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductImage {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    pub table: String,
    pub images: Vec<ProductImage>,
    pub product_count: usize,
}

struct ProductInfo {
    content: String,
    image_url: Option<String>,
}

async fn fetch_product_info(
    retriever: &HybridRetriever,
    product_name: &str,
    per_product_k: usize,
) -> ProductInfo {
    match retriever.fuse(product_name, per_product_k).await {
        Ok(results) if results.is_empty() => ProductInfo {
            content: "Không tìm thấy thông tin.".to_string(),
            image_url: None,
        },
        Ok(results) => {
            let image_url = results[0].passage.metadata.image_url.clone();
            let content = results
                .iter()
                .map(|r| r.passage.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            ProductInfo { content, image_url }
        }
        Err(err) => {
            tracing::warn!("Comparison fetch failed for {}: {}", product_name, err);
            ProductInfo {
                content: format!("Lỗi khi truy xuất thông tin cho {}.", product_name),
                image_url: None,
            }
        }
    }
}

pub async fn run(
    retriever: &HybridRetriever,
    products: &[String],
    per_product_k: usize,
) -> ComparisonOutcome {
    if products.len() < 2 {
        return ComparisonOutcome {
            table: TOO_FEW_PRODUCTS_MESSAGE.to_string(),
            images: Vec::new(),
            product_count: products.len(),
        };
    }

    let infos = join_all(
        products
            .iter()
            .map(|name| fetch_product_info(retriever, name, per_product_k)),
    )
    .await;

    let images: Vec<ProductImage> = products
        .iter()
        .zip(&infos)
        .filter_map(|(name, info)| {
            info.image_url.as_ref().map(|url| ProductImage {
                name: name.clone(),
                url: url.clone(),
            })
        })
        .collect();

    let header = format!("| Tính năng | {} |", products.join(" | "));
    let separator = format!("|:--- |{}", " :--- |".repeat(products.len()));
    let cells: Vec<String> = infos.iter().map(|info| escape_cell(&info.content)).collect();
    let info_row = format!("| **Thông tin chi tiết** | {} |", cells.join(" | "));

    ComparisonOutcome {
        table: [header, separator, info_row].join("\n"),
        images,
        product_count: products.len(),
    }
}

fn escape_cell(content: &str) -> String {
    content.replace('|', "\\|").replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::retrieval::passage::{test_passage, Passage};
    use crate::retrieval::{FusionWeights, LexicalIndex, QueryCache};

    async fn retriever_over(passages: Vec<Passage>) -> HybridRetriever {
        struct EmptyVector;

        #[async_trait::async_trait]
        impl crate::retrieval::VectorIndex for EmptyVector {
            async fn similarity_search(
                &self,
                _query: &str,
                _k: usize,
            ) -> Result<Vec<crate::retrieval::RankedResult>, crate::core::errors::ApiError>
            {
                Ok(Vec::new())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::mem::forget(dir);
        HybridRetriever::new(
            Arc::new(LexicalIndex::build(passages)),
            Arc::new(EmptyVector),
            Arc::new(QueryCache::with_path(path).await.unwrap()),
            FusionWeights::default(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn fewer_than_two_products_is_refused() {
        let retriever = retriever_over(Vec::new()).await;
        let outcome = run(&retriever, &["iPhone 16".to_string()], 3).await;

        assert_eq!(outcome.table, TOO_FEW_PRODUCTS_MESSAGE);
        assert!(outcome.images.is_empty());
    }

    #[tokio::test]
    async fn builds_table_and_collects_images() {
        let mut p1 = test_passage("p1", "iphone-16", "Chip A18 | pin tốt");
        p1.metadata.image_url = Some("https://shop.example/16.jpg".to_string());
        let p2 = test_passage("p2", "galaxy-s24", "Snapdragon 8 Gen 3");
        let retriever = retriever_over(vec![p1, p2]).await;

        let products = vec!["iphone 16 chip a18".to_string(), "galaxy snapdragon".to_string()];
        let outcome = run(&retriever, &products, 3).await;

        assert_eq!(outcome.product_count, 2);
        let lines: Vec<&str> = outcome.table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("| Tính năng |"));
        // Pipe inside content is escaped so the table stays well-formed.
        assert!(lines[2].contains("Chip A18 \\| pin tốt"));
        assert_eq!(outcome.images.len(), 1);
        assert_eq!(outcome.images[0].url, "https://shop.example/16.jpg");
    }

    #[tokio::test]
    async fn missing_product_gets_not_found_cell() {
        let retriever =
            retriever_over(vec![test_passage("p1", "iphone-16", "iPhone 16 chip A18")]).await;

        let products = vec!["iphone 16".to_string(), "nokia 3310".to_string()];
        let outcome = run(&retriever, &products, 3).await;

        assert!(outcome.table.contains("Không tìm thấy thông tin."));
    }
}
