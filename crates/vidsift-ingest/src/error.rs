use thiserror::Error;

use vidsift_providers::{ProviderError, TranscriptError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("blob I/O error: {0}")]
    Blob(#[from] std::io::Error),

    #[error("transcript blob exceeds size cap: {size} bytes")]
    BlobTooLarge { size: usize },

    #[error("invalid video id: {0}")]
    InvalidVideoId(String),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error("metadata provider error: {0}")]
    Metadata(#[from] ProviderError),

    #[error("queue error: {0}")]
    Queue(#[from] vidsift_queue::QueueError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
