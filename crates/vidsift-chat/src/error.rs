use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Search(#[from] vidsift_search::SearchError),

    #[error(transparent)]
    Store(#[from] vidsift_ingest::IngestError),

    #[error("LLM error: {0}")]
    Llm(#[from] vidsift_providers::ProviderError),

    #[error("cache error: {0}")]
    Cache(#[from] vidsift_cache::CacheError),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
