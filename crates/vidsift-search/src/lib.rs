//! `vidsift-search` — hybrid retrieval over transcript chunks.
//!
//! Dense cosine similarity and symbolic keyword matching are merged with
//! additive boosts; channel-wide searches are diversified so one video
//! cannot monopolise the result set. Selected chunks are hydrated with
//! their full text from the transcript blobs.

pub mod engine;
pub mod error;

pub use engine::{RetrievalEngine, RetrievedChunk};
pub use error::{Result, SearchError};
