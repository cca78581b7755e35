use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatPipeline;
use crate::core::config::{AppConfig, AppPaths};
use crate::llm::LlmService;
use crate::memory::ConversationMemory;
use crate::retrieval::{
    EmbeddingCrossEncoder, FusionWeights, HybridRetriever, LexicalIndex, QueryCache,
    RerankPolicy, Reranker, SqliteVectorStore,
};
use crate::router::IntentRouter;

pub mod error;

use error::InitializationError;

/// Global application state shared across all routes.
///
/// Every component is constructed exactly once here and passed by handle;
/// nothing is looked up through ambient globals.
pub struct AppState {
    pub paths: AppPaths,
    pub config: AppConfig,
    pub llm: LlmService,
    pub memory: Arc<ConversationMemory>,
    pub pipeline: Arc<ChatPipeline>,
    pub corpus_size: usize,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// Cache or catalog-store unavailability here aborts startup: a process
    /// that cannot load its corpus has nothing to serve.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = AppPaths::new();
        std::fs::create_dir_all(&paths.data_dir)
            .map_err(|e| InitializationError::Config(e.into()))?;

        let config = AppConfig::load(&paths).map_err(|e| InitializationError::Config(e.into()))?;

        let llm = LlmService::from_config(&config.provider)
            .map_err(|e| InitializationError::Llm(e.into()))?;

        let cache = Arc::new(
            QueryCache::with_path(paths.cache_db_path.clone())
                .await
                .map_err(|e| InitializationError::Cache(e.into()))?,
        );

        let vector_store = Arc::new(
            SqliteVectorStore::with_path(paths.catalog_db_path.clone(), llm.clone())
                .await
                .map_err(|e| InitializationError::Catalog(e.into()))?,
        );

        // Corpus load: read every passage once to seed the lexical index.
        // An empty catalog is seeded with the welcome sentinel on both sides.
        let mut passages = vector_store
            .all_passages()
            .await
            .map_err(|e| InitializationError::Corpus(e.into()))?;
        if passages.is_empty() {
            tracing::warn!("Catalog is empty, seeding welcome sentinel");
            let sentinel = vector_store
                .seed_welcome()
                .await
                .map_err(|e| InitializationError::Corpus(e.into()))?;
            passages.push(sentinel);
        }
        let corpus_size = passages.len();
        tracing::info!("Loaded {} passages from catalog", corpus_size);

        let lexical = Arc::new(LexicalIndex::build(passages));

        let cache_ttl = Duration::from_secs(config.retrieval.cache_ttl_secs);
        let retriever = Arc::new(HybridRetriever::new(
            lexical,
            vector_store,
            cache.clone(),
            FusionWeights {
                lexical: config.retrieval.lexical_weight,
                vector: config.retrieval.vector_weight,
            },
            cache_ttl,
        ));

        let reranker = Arc::new(Reranker::new(
            Arc::new(EmbeddingCrossEncoder::new(llm.clone())),
            cache,
            RerankPolicy::from_config(&config.rerank),
            config.rerank.max_content_chars,
            cache_ttl,
        ));

        let router = Arc::new(IntentRouter::new(llm.clone(), config.router.max_retries));
        let memory = Arc::new(ConversationMemory::new(
            llm.clone(),
            config.memory.summary_threshold,
        ));

        let pipeline = Arc::new(ChatPipeline::new(
            router,
            retriever,
            reranker,
            memory.clone(),
            llm.clone(),
            config.retrieval.top_k,
            config.retrieval.compare_k,
        ));

        Ok(Arc::new(AppState {
            paths,
            config,
            llm,
            memory,
            pipeline,
            corpus_size,
        }))
    }
}
