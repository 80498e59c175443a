//! `vidsift-ingest` — transcript indexing.
//!
//! The catalog owns the channel/video/chunk tables; the blob container
//! holds raw transcripts; the chunker turns caption segments into bounded
//! retrieval units; the video and channel pipelines drive the whole thing
//! under distributed locks.

pub mod blob;
pub mod catalog;
pub mod channel;
pub mod chunker;
pub mod db;
pub mod error;
pub mod video;

pub use blob::TranscriptBlobs;
pub use catalog::{ChannelRecord, ChunkRecord, VideoCatalog, VideoRecord};
pub use channel::ChannelPipeline;
pub use chunker::{chunk_segments, Chunk};
pub use error::{IngestError, Result};
pub use video::VideoPipeline;
