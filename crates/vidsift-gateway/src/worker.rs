use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use vidsift_ingest::{ChannelPipeline, VideoCatalog, VideoPipeline};
use vidsift_providers::YoutubeClient;
use vidsift_queue::QueueWorker;

/// Pause between channels during the 6-hour refresh sweep.
const REFRESH_CHANNEL_PAUSE_SECS: u64 = 1;
/// New-video lookups per channel during refresh.
const REFRESH_LOOKUP_LIMIT: usize = 20;

/// Adapts the ingest pipelines and the catalog onto the dispatcher's
/// [`QueueWorker`] interface.
pub struct PipelineWorker {
    channels: Arc<ChannelPipeline>,
    videos: Arc<VideoPipeline>,
    catalog: Arc<VideoCatalog>,
    youtube: Arc<YoutubeClient>,
}

impl PipelineWorker {
    pub fn new(
        channels: Arc<ChannelPipeline>,
        videos: Arc<VideoPipeline>,
        catalog: Arc<VideoCatalog>,
        youtube: Arc<YoutubeClient>,
    ) -> Self {
        Self {
            channels,
            videos,
            catalog,
            youtube,
        }
    }
}

#[async_trait]
impl QueueWorker for PipelineWorker {
    async fn process_channel_item(&self, qid: &str) {
        self.channels.process_queue_item(qid).await;
    }

    async fn process_video(&self, video_id: &str) {
        self.videos.process(video_id).await;
    }

    async fn queued_video_ids(&self, limit: usize) -> Vec<String> {
        self.catalog.queued_video_ids(limit).unwrap_or_else(|e| {
            warn!(error = %e, "queued-video lookup failed");
            Vec::new()
        })
    }

    /// Poll every ready channel for videos published after its newest
    /// known video and flag them for the video tick.
    async fn refresh_ready_channels(&self) {
        let channels = match self.catalog.ready_channels() {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "ready-channel lookup failed");
                return;
            }
        };

        for channel in channels {
            let Ok(Some(newest)) = self.catalog.newest_video_published_at(&channel.id) else {
                continue;
            };
            match self
                .youtube
                .videos_published_after(&channel.id, &newest, REFRESH_LOOKUP_LIMIT)
                .await
            {
                Ok(fresh) => {
                    // The listing is newest-first and inclusive of the
                    // boundary instant; skip the video we already know.
                    let fresh: Vec<_> = fresh
                        .into_iter()
                        .filter(|v| v.published_at > newest)
                        .collect();
                    if fresh.is_empty() {
                        continue;
                    }
                    info!(channel_id = %channel.id, count = fresh.len(), "new videos found on refresh");
                    for video in fresh {
                        if let Err(e) = self
                            .catalog
                            .upsert_video(&video, Some(&channel.id))
                            .and_then(|_| self.catalog.mark_video_queued(&video.id))
                        {
                            warn!(video_id = %video.id, error = %e, "could not queue refreshed video");
                        }
                    }
                }
                Err(e) => {
                    warn!(channel_id = %channel.id, error = %e, "refresh listing failed");
                }
            }
            tokio::time::sleep(Duration::from_secs(REFRESH_CHANNEL_PAUSE_SECS)).await;
        }
    }
}
