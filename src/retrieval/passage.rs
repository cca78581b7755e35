use serde::{Deserialize, Serialize};

/// Catalog metadata attached to every indexed passage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageMetadata {
    /// Aggregation key: ranked lists never contain a product twice.
    pub product_id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// An immutable indexed catalog passage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub content: String,
    pub metadata: PassageMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankSource {
    Lexical,
    Vector,
    Fused,
    Reranked,
}

/// A scored passage produced by one retrieval stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedResult {
    pub passage: Passage,
    pub score: f32,
    pub source: RankSource,
}

/// Sentinel passage seeded when the corpus is empty, so queries over an
/// empty store return a defined result instead of failing.
pub fn welcome_passage() -> Passage {
    Passage {
        id: "welcome".to_string(),
        content: "Chào mừng bạn đến với shop điện thoại!".to_string(),
        metadata: PassageMetadata {
            product_id: "welcome".to_string(),
            title: "Shop điện thoại".to_string(),
            url: String::new(),
            price: None,
            image_url: None,
            topic: None,
        },
    }
}

#[cfg(test)]
pub fn test_passage(id: &str, product_id: &str, content: &str) -> Passage {
    Passage {
        id: id.to_string(),
        content: content.to_string(),
        metadata: PassageMetadata {
            product_id: product_id.to_string(),
            title: format!("title-{}", product_id),
            url: format!("https://shop.example/{}", product_id),
            price: None,
            image_url: None,
            topic: None,
        },
    }
}
