//! Disk-backed TTL cache for ranked retrieval results.
//!
//! One shared key space across the fusion and rerank stages; the stage tag
//! is folded into the key. Reads after expiry are misses, and any failure
//! on the read path (I/O, corrupt payload) degrades to a miss rather than
//! failing the request.

use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::passage::RankedResult;
use crate::core::errors::ApiError;

pub struct QueryCache {
    pool: SqlitePool,
}

impl QueryCache {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
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

        let cache = Self { pool };
        cache.init_schema().await?;
        Ok(cache)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS query_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Content-addressed cache key over the query, requested depth and
    /// pipeline stage.
    pub fn key(query: &str, top_k: usize, stage: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update(b"|");
        hasher.update(top_k.to_string().as_bytes());
        if let Some(stage) = stage {
            hasher.update(b"|");
            hasher.update(stage.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Returns the cached results, or `None` for a miss. Expired and
    /// unreadable entries are misses.
    pub async fn get(&self, key: &str) -> Option<Vec<RankedResult>> {
        let row = match sqlx::query("SELECT value, expires_at FROM query_cache WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row?,
            Err(err) => {
                tracing::warn!("Cache read failed, treating as miss: {}", err);
                return None;
            }
        };

        let expires_at: String = row.get("expires_at");
        let expired = match chrono::DateTime::parse_from_rfc3339(&expires_at) {
            Ok(ts) => chrono::Utc::now() > ts.with_timezone(&chrono::Utc),
            // Unparseable expiry counts as corruption.
            Err(_) => true,
        };
        if expired {
            let _ = sqlx::query("DELETE FROM query_cache WHERE key = ?1")
                .bind(key)
                .execute(&self.pool)
                .await;
            return None;
        }

        let value: String = row.get("value");
        match serde_json::from_str::<Vec<RankedResult>>(&value) {
            Ok(results) => Some(results),
            Err(err) => {
                tracing::warn!("Corrupt cache entry {}, treating as miss: {}", key, err);
                None
            }
        }
    }

    /// Last-writer-wins upsert; entries are deterministic recomputations,
    /// so races between writers are harmless.
    pub async fn set(
        &self,
        key: &str,
        value: &[RankedResult],
        ttl: Duration,
    ) -> Result<(), ApiError> {
        let payload = serde_json::to_string(value).map_err(ApiError::internal)?;
        let expires_at = (chrono::Utc::now()
            + chrono::Duration::from_std(ttl).map_err(ApiError::internal)?)
        .to_rfc3339();

        sqlx::query("INSERT OR REPLACE INTO query_cache (key, value, expires_at) VALUES (?1, ?2, ?3)")
            .bind(key)
            .bind(payload)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::passage::{test_passage, RankSource, RankedResult};

    async fn test_cache() -> QueryCache {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        // Leak the tempdir so the file outlives the handle for the test.
        std::mem::forget(dir);
        QueryCache::with_path(path).await.unwrap()
    }

    fn results() -> Vec<RankedResult> {
        vec![RankedResult {
            passage: test_passage("p1", "iphone-16", "iPhone 16"),
            score: 1.0,
            source: RankSource::Fused,
        }]
    }

    #[test]
    fn key_separates_stages_and_depths() {
        let base = QueryCache::key("iphone", 3, None);
        assert_ne!(base, QueryCache::key("iphone", 4, None));
        assert_ne!(base, QueryCache::key("iphone", 3, Some("rerank")));
        assert_eq!(base, QueryCache::key("iphone", 3, None));
    }

    #[tokio::test]
    async fn round_trips_within_ttl() {
        let cache = test_cache().await;
        let key = QueryCache::key("iphone", 3, None);

        assert!(cache.get(&key).await.is_none());
        cache
            .set(&key, &results(), Duration::from_secs(60))
            .await
            .unwrap();

        let hit = cache.get(&key).await.unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].passage.id, "p1");
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = test_cache().await;
        let key = QueryCache::key("iphone", 3, None);

        cache
            .set(&key, &results(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss() {
        let cache = test_cache().await;
        let key = QueryCache::key("iphone", 3, None);
        let expires = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();

        sqlx::query("INSERT INTO query_cache (key, value, expires_at) VALUES (?1, ?2, ?3)")
            .bind(&key)
            .bind("not json {")
            .bind(expires)
            .execute(&cache.pool)
            .await
            .unwrap();

        assert!(cache.get(&key).await.is_none());
    }
}
