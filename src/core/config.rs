//! Typed application configuration.
//!
//! Configuration is read once at startup from a YAML file. Missing file or
//! missing sections fall back to defaults so a bare deployment still boots.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

/// Filesystem locations used by the process.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub catalog_db_path: PathBuf,
    pub cache_db_path: PathBuf,
    pub stores_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = env::var("LISA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        Self {
            log_dir: data_dir.join("logs"),
            catalog_db_path: data_dir.join("catalog.db"),
            cache_db_path: data_dir.join("query_cache.db"),
            stores_path: data_dir.join("stores.json"),
            data_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("LISA_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        self.data_dir.join("config.yml")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_compare_k")]
    pub compare_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankMode {
    TopK,
    Threshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default = "default_rerank_mode")]
    pub mode: RerankMode,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl AppConfig {
    /// Load configuration from the resolved config path.
    ///
    /// A missing file yields the default configuration; an unreadable or
    /// malformed file is a startup error.
    pub fn load(paths: &AppPaths) -> Result<Self, ApiError> {
        let path = paths.config_path();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(ApiError::internal)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ApiError::Internal(format!("invalid config {}: {}", path.display(), e)))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider: ProviderConfig::default(),
            retrieval: RetrievalConfig::default(),
            rerank: RerankConfig::default(),
            router: RouterConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            base_url: default_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            lexical_weight: default_lexical_weight(),
            vector_weight: default_vector_weight(),
            cache_ttl_secs: default_cache_ttl_secs(),
            compare_k: default_compare_k(),
        }
    }
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            mode: default_rerank_mode(),
            score_threshold: default_score_threshold(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            summary_threshold: default_summary_threshold(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Ollama
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_request_timeout_secs() -> u64 {
    240
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_top_k() -> usize {
    3
}

fn default_lexical_weight() -> f32 {
    0.5
}

fn default_vector_weight() -> f32 {
    0.5
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_compare_k() -> usize {
    3
}

fn default_rerank_mode() -> RerankMode {
    RerankMode::TopK
}

fn default_score_threshold() -> f32 {
    5.0
}

fn default_max_content_chars() -> usize {
    2048
}

fn default_max_retries() -> u32 {
    2
}

fn default_summary_threshold() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.lexical_weight, 0.5);
        assert_eq!(config.retrieval.vector_weight, 0.5);
        assert_eq!(config.retrieval.cache_ttl_secs, 86_400);
        assert_eq!(config.router.max_retries, 2);
        assert_eq!(config.memory.summary_threshold, 10);
        assert!(matches!(config.rerank.mode, RerankMode::TopK));
    }

    #[test]
    fn partial_yaml_fills_missing_sections_with_defaults() {
        let yaml = "retrieval:\n  top_k: 5\nrerank:\n  mode: threshold\n";
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert!(matches!(config.rerank.mode, RerankMode::Threshold));
        assert_eq!(config.retrieval.lexical_weight, 0.5);
        assert_eq!(config.memory.summary_threshold, 10);
    }
}
