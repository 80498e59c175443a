use std::sync::Arc;

use tracing::{info, warn};

use vidsift_errors::ErrorSink;
use vidsift_locks::LockManager;
use vidsift_providers::{EmbeddingClient, TranscriptFetcher};

use crate::blob::TranscriptBlobs;
use crate::catalog::VideoCatalog;
use crate::chunker::chunk_segments;
use crate::error::Result;

/// Lease TTL for a single video run.
const VIDEO_LOCK_TTL_SECS: u64 = 600;

/// Fetch → blob → chunk → embed → persist, for one video.
pub struct VideoPipeline {
    catalog: Arc<VideoCatalog>,
    blobs: Arc<TranscriptBlobs>,
    locks: Arc<LockManager>,
    transcripts: Arc<TranscriptFetcher>,
    embeddings: Arc<EmbeddingClient>,
    sink: Arc<ErrorSink>,
}

impl VideoPipeline {
    pub fn new(
        catalog: Arc<VideoCatalog>,
        blobs: Arc<TranscriptBlobs>,
        locks: Arc<LockManager>,
        transcripts: Arc<TranscriptFetcher>,
        embeddings: Arc<EmbeddingClient>,
        sink: Arc<ErrorSink>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            locks,
            transcripts,
            embeddings,
            sink,
        }
    }

    /// Process one video under the `video-<id>` lock. Returns true on
    /// success; false when the transcript could not be indexed or another
    /// worker holds the lock. Failures are recorded on the video row.
    pub async fn process(&self, video_id: &str) -> bool {
        let resource = format!("video-{video_id}");
        let Some(lease) = self.locks.acquire(&resource, VIDEO_LOCK_TTL_SECS) else {
            info!(video_id, "video already being processed; skipping");
            return false;
        };

        let outcome = self.run(video_id).await;
        self.locks.release(&lease);

        match outcome {
            Ok(chunk_count) => {
                info!(video_id, chunks = chunk_count, "video indexed");
                true
            }
            Err(e) => {
                warn!(video_id, error = %e, "video processing failed");
                if let Err(store_err) = self.catalog.mark_video_failed(video_id, &e.to_string()) {
                    warn!(video_id, error = %store_err, "could not record processing error");
                }
                self.sink.capture(
                    "VIDEO_PIPELINE",
                    &e.to_string(),
                    None,
                    serde_json::json!({ "video_id": video_id }),
                );
                false
            }
        }
    }

    async fn run(&self, video_id: &str) -> Result<usize> {
        // 1. Transcript. An empty track already surfaces as NoTranscript.
        let segments = self.transcripts.fetch(video_id).await?;

        // 2–3. Chunk boundaries first, then the blob as the exact
        // concatenation of chunk texts — offsets agree by construction.
        let chunks = chunk_segments(&segments);
        let blob_content: String = chunks.iter().map(|c| c.text.as_str()).collect();
        let blob_path = self.blobs.write(video_id, &blob_content)?;

        // 4. Embeddings. Nulls are kept; those chunks stay keyword-only.
        let texts: Vec<String> = chunks.iter().map(|c| c.plain_text.clone()).collect();
        let embeddings = self.embeddings.embed(&texts).await;

        // 5. The only step that mutates chunks: swap the whole set.
        self.catalog.ensure_video(video_id)?;
        self.catalog.replace_chunks(video_id, &chunks, &embeddings)?;

        // 6. Flip the flags last, once everything below them is in place.
        self.catalog.mark_video_processed(video_id, &blob_path)?;
        Ok(chunks.len())
    }
}
