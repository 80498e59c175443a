use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("queue item not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
