//! Embedding-backed vector index.
//!
//! The production store keeps the catalog in sqlite with embedding blobs,
//! embeds the query through the LLM provider and ranks by brute-force
//! cosine similarity. The trait boundary keeps the fusion engine testable
//! without a live embedding model.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::passage::{welcome_passage, Passage, PassageMetadata, RankSource, RankedResult};
use crate::core::errors::ApiError;
use crate::llm::LlmService;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedResult>, ApiError>;
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    llm: LlmService,
}

impl SqliteVectorStore {
    pub async fn with_path(db_path: PathBuf, llm: LlmService) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, llm };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS passages (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                product_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL DEFAULT '',
                price INTEGER,
                image_url TEXT,
                topic TEXT,
                embedding BLOB
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_passages_product ON passages(product_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
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

    fn row_to_passage(row: &sqlx::sqlite::SqliteRow) -> Passage {
        Passage {
            id: row.get("id"),
            content: row.get("content"),
            metadata: PassageMetadata {
                product_id: row.get("product_id"),
                title: row.get("title"),
                url: row.get("url"),
                price: row.get("price"),
                image_url: row.get("image_url"),
                topic: row.get("topic"),
            },
        }
    }

    pub async fn insert(&self, passage: &Passage, embedding: &[f32]) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT OR REPLACE INTO passages
             (id, content, product_id, title, url, price, image_url, topic, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&passage.id)
        .bind(&passage.content)
        .bind(&passage.metadata.product_id)
        .bind(&passage.metadata.title)
        .bind(&passage.metadata.url)
        .bind(passage.metadata.price)
        .bind(&passage.metadata.image_url)
        .bind(&passage.metadata.topic)
        .bind(Self::serialize_embedding(embedding))
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count as usize)
    }

    /// Full corpus read, used once at startup to seed the lexical index.
    pub async fn all_passages(&self) -> Result<Vec<Passage>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, content, product_id, title, url, price, image_url, topic
             FROM passages ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::row_to_passage).collect())
    }

    /// Seed the welcome sentinel into an empty store. The sentinel carries
    /// an empty embedding and scores zero against every query, which is
    /// the intended degenerate behavior for an empty catalog.
    pub async fn seed_welcome(&self) -> Result<Passage, ApiError> {
        let sentinel = welcome_passage();
        self.insert(&sentinel, &[]).await?;
        Ok(sentinel)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorStore {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedResult>, ApiError> {
        let embeddings = self.llm.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Internal("embedding model returned no vector".to_string()))?;

        let rows = sqlx::query(
            "SELECT id, content, product_id, title, url, price, image_url, topic, embedding
             FROM passages",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<RankedResult> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                RankedResult {
                    passage: Self::row_to_passage(row),
                    score: Self::cosine_similarity(&query_embedding, &stored),
                    source: RankSource::Vector,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k.max(1));

        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{hash_embedding, scripted_service};
    use crate::retrieval::passage::test_passage;

    async fn test_store() -> SqliteVectorStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        std::mem::forget(dir);
        let (llm, _) = scripted_service(vec![]);
        SqliteVectorStore::with_path(path, llm).await.unwrap()
    }

    #[tokio::test]
    async fn similarity_search_ranks_matching_passage_first() {
        let store = test_store().await;

        let p1 = test_passage("p1", "iphone-16", "iPhone 16 chip A18 camera 48MP");
        let p2 = test_passage("p2", "galaxy-s24", "Samsung Galaxy S24 Snapdragon 8");
        store.insert(&p1, &hash_embedding(&p1.content)).await.unwrap();
        store.insert(&p2, &hash_embedding(&p2.content)).await.unwrap();

        let results = store
            .similarity_search("iPhone 16 chip A18", 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].passage.id, "p1");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn all_passages_round_trips_metadata() {
        let store = test_store().await;

        let mut passage = test_passage("p1", "iphone-16", "iPhone 16");
        passage.metadata.price = Some(25_000_000);
        passage.metadata.image_url = Some("https://shop.example/16.jpg".to_string());
        store.insert(&passage, &[1.0, 0.0]).await.unwrap();

        let all = store.all_passages().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].metadata.price, Some(25_000_000));
        assert_eq!(
            all[0].metadata.image_url.as_deref(),
            Some("https://shop.example/16.jpg")
        );
    }

    #[tokio::test]
    async fn empty_store_seeds_welcome_sentinel() {
        let store = test_store().await;
        assert_eq!(store.count().await.unwrap(), 0);

        store.seed_welcome().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let results = store.similarity_search("iphone", 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.id, "welcome");
        assert_eq!(results[0].score, 0.0);
    }
}
