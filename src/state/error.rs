use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("Failed to initialize LLM provider: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("Failed to initialize result cache: {0}")]
    Cache(#[source] anyhow::Error),

    #[error("Failed to initialize catalog store: {0}")]
    Catalog(#[source] anyhow::Error),

    #[error("Failed to load corpus: {0}")]
    Corpus(#[source] anyhow::Error),
}
