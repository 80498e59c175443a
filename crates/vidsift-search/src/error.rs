use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Store(#[from] vidsift_ingest::IngestError),
}

pub type Result<T> = std::result::Result<T, SearchError>;
