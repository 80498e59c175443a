use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use vidsift_cache::{cache_key, CacheStore, SUMMARY_TTL_SECS};
use vidsift_ingest::{TranscriptBlobs, VideoCatalog};
use vidsift_providers::{ChatTurn, LlmClient, Role};

use crate::error::{ChatError, Result};

/// Transcripts are truncated to this many characters before
/// summarisation. The `truncated` response field makes the cut visible at
/// the API surface.
const SUMMARY_INPUT_CHARS: usize = 8000;

const SUMMARY_SYSTEM: &str = "You summarise video transcripts. Produce a concise summary \
of the main points in 3-5 short paragraphs, followed by up to five key takeaways as a \
bulleted list. Do not invent content that is not in the transcript.";

/// A generated (or cached) video summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSummary {
    pub video_id: String,
    pub title: String,
    pub summary: String,
    /// True when the transcript was cut at the input budget.
    pub truncated: bool,
}

/// Generates cached summaries over stored transcripts.
pub struct SummaryService {
    catalog: Arc<VideoCatalog>,
    blobs: Arc<TranscriptBlobs>,
    llm: Arc<LlmClient>,
    cache: Arc<CacheStore>,
}

impl SummaryService {
    pub fn new(
        catalog: Arc<VideoCatalog>,
        blobs: Arc<TranscriptBlobs>,
        llm: Arc<LlmClient>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            llm,
            cache,
        }
    }

    /// Return the cached summary for a video, generating one when needed.
    pub async fn video_summary(&self, video_id: &str) -> Result<VideoSummary> {
        let key = cache_key("summary", &[video_id]);
        if let Some(value) = self.cache.get(&key)? {
            if let Ok(summary) = serde_json::from_value::<VideoSummary>(value) {
                debug!(video_id, "summary cache hit");
                return Ok(summary);
            }
        }

        let video = self
            .catalog
            .video(video_id)?
            .ok_or_else(|| ChatError::NotFound(format!("video {video_id}")))?;
        let blob_path = video
            .transcript_blob_path
            .as_deref()
            .filter(|_| video.transcript_cached)
            .ok_or_else(|| {
                ChatError::NotFound(format!("no cached transcript for video {video_id}"))
            })?;

        let transcript =
            String::from_utf8_lossy(&self.blobs.read_bytes(blob_path)?).into_owned();
        let (input, truncated) = truncate_chars(&transcript, SUMMARY_INPUT_CHARS);

        let request = format!(
            "Video title: {}\n\nTranscript:\n{}",
            video.title, input
        );
        let summary_text = self
            .llm
            .complete(
                SUMMARY_SYSTEM,
                &[ChatTurn {
                    role: Role::User,
                    content: request,
                }],
            )
            .await?;

        let summary = VideoSummary {
            video_id: video_id.to_string(),
            title: video.title,
            summary: summary_text,
            truncated,
        };
        if let Ok(value) = serde_json::to_value(&summary) {
            self.cache.set(&key, &value, SUMMARY_TTL_SECS)?;
        }
        Ok(summary)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        (text.to_string(), false)
    } else {
        (text.chars().take(max_chars).collect(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_transcripts_pass_through() {
        let (out, truncated) = truncate_chars("short transcript", SUMMARY_INPUT_CHARS);
        assert_eq!(out, "short transcript");
        assert!(!truncated);
    }

    #[test]
    fn long_transcripts_are_cut_at_the_budget() {
        let long = "x".repeat(SUMMARY_INPUT_CHARS + 500);
        let (out, truncated) = truncate_chars(&long, SUMMARY_INPUT_CHARS);
        assert_eq!(out.chars().count(), SUMMARY_INPUT_CHARS);
        assert!(truncated);
    }
}
