use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use vidsift_core::types::{ChannelRunStats, ChannelStatus};
use vidsift_errors::ErrorSink;
use vidsift_locks::LockManager;
use vidsift_providers::{EmailClient, YoutubeClient};
use vidsift_queue::QueueManager;

use crate::catalog::VideoCatalog;
use crate::error::Result;
use crate::video::VideoPipeline;

/// Lease TTL for a whole channel run.
const CHANNEL_LOCK_TTL_SECS: u64 = 3600;
/// Politeness pause between videos.
const INTER_VIDEO_SLEEP_SECS: u64 = 2;

/// Enumerates a channel's videos and drives the video pipeline for each,
/// reporting progress onto the queue row as it goes.
pub struct ChannelPipeline {
    catalog: Arc<VideoCatalog>,
    queue: Arc<QueueManager>,
    locks: Arc<LockManager>,
    youtube: Arc<YoutubeClient>,
    videos: Arc<VideoPipeline>,
    email: Option<Arc<EmailClient>>,
    sink: Arc<ErrorSink>,
    max_videos: usize,
}

impl ChannelPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<VideoCatalog>,
        queue: Arc<QueueManager>,
        locks: Arc<LockManager>,
        youtube: Arc<YoutubeClient>,
        videos: Arc<VideoPipeline>,
        email: Option<Arc<EmailClient>>,
        sink: Arc<ErrorSink>,
        max_videos: usize,
    ) -> Self {
        Self {
            catalog,
            queue,
            locks,
            youtube,
            videos,
            email,
            sink,
            max_videos,
        }
    }

    /// Process one queue item under the `channel-queue-<qid>` lock.
    ///
    /// A single video failure never aborts the run; failures are counted
    /// and the run completes. Only an unrecovered error (store, metadata
    /// provider) fails the queue item.
    pub async fn process_queue_item(&self, qid: &str) {
        let item = match self.queue.get(qid) {
            Ok(item) => item,
            Err(e) => {
                warn!(qid, error = %e, "queue item lookup failed; rejecting");
                return;
            }
        };

        let resource = format!("channel-queue-{qid}");
        let Some(lease) = self.locks.acquire(&resource, CHANNEL_LOCK_TTL_SECS) else {
            info!(qid, "queue item already being processed; skipping");
            return;
        };

        // pending → processing; a false here means another instance won
        // between our lock acquire and a prior lease's release.
        match self.queue.begin_processing(qid) {
            Ok(true) => {}
            Ok(false) => {
                info!(qid, "queue item no longer pending; skipping");
                self.locks.release(&lease);
                return;
            }
            Err(e) => {
                error!(qid, error = %e, "queue transition failed");
                self.locks.release(&lease);
                return;
            }
        }

        let outcome = self.run(qid, &item.channel_id).await;
        self.locks.release(&lease);

        let channel_title = self
            .catalog
            .channel(&item.channel_id)
            .ok()
            .flatten()
            .map(|c| c.title)
            .unwrap_or_else(|| item.channel_id.clone());

        match outcome {
            Ok(stats) => {
                info!(
                    qid,
                    channel_id = %item.channel_id,
                    processed = stats.processed,
                    existing = stats.existing,
                    no_transcript = stats.no_transcript,
                    failed = stats.failed,
                    "channel run completed"
                );
                self.notify(&item.requested_email, &channel_title, true, &stats, None)
                    .await;
            }
            Err(e) => {
                error!(qid, channel_id = %item.channel_id, error = %e, "channel run failed");
                if let Err(qerr) = self.queue.fail(qid, &e.to_string()) {
                    error!(qid, error = %qerr, "could not record queue failure");
                }
                let _ = self
                    .catalog
                    .set_channel_status(&item.channel_id, ChannelStatus::Failed);
                self.sink.capture(
                    "CHANNEL_PIPELINE",
                    &e.to_string(),
                    None,
                    serde_json::json!({ "queue_id": qid, "channel_id": item.channel_id }),
                );
                self.notify(
                    &item.requested_email,
                    &channel_title,
                    false,
                    &ChannelRunStats::default(),
                    Some(&e.to_string()),
                )
                .await;
            }
        }
    }

    async fn run(&self, qid: &str, channel_ref: &str) -> Result<ChannelRunStats> {
        // Resolve the channel (handle or id) and make sure a row exists.
        let channel = self.youtube.resolve_channel(channel_ref).await?;
        self.catalog.upsert_channel(&channel.id, &channel.title)?;
        self.catalog
            .set_channel_status(&channel.id, ChannelStatus::Processing)?;

        let videos = self.youtube.list_videos(&channel.id, self.max_videos).await?;
        let mut stats = ChannelRunStats {
            total: videos.len(),
            ..Default::default()
        };
        self.queue.set_totals(qid, videos.len() as u32)?;

        for (i, video) in videos.iter().enumerate() {
            self.queue
                .update_progress(qid, (i + 1) as u32, &video.title)?;

            if self.already_indexed(&video.id)? {
                stats.existing += 1;
                stats.processed += 1;
                continue;
            }

            self.catalog.upsert_video(video, Some(&channel.id))?;
            if self.videos.process(&video.id).await {
                stats.processed += 1;
            } else {
                self.classify_failure(&video.id, &mut stats)?;
            }

            if i + 1 < videos.len() {
                tokio::time::sleep(Duration::from_secs(INTER_VIDEO_SLEEP_SECS)).await;
            }
        }

        self.queue.complete(qid, stats.processed as u32)?;
        self.catalog
            .finish_channel(&channel.id, stats.processed as u32)?;
        Ok(stats)
    }

    fn already_indexed(&self, video_id: &str) -> Result<bool> {
        Ok(self
            .catalog
            .video(video_id)?
            .is_some_and(|v| v.transcript_cached && v.chunks_processed))
    }

    /// Bucket a failed video by its recorded error: caption problems are
    /// expected and tracked separately from real failures.
    fn classify_failure(&self, video_id: &str, stats: &mut ChannelRunStats) -> Result<()> {
        let error = self
            .catalog
            .video(video_id)?
            .and_then(|v| v.processing_error)
            .unwrap_or_default();
        let lowered = error.to_lowercase();
        if lowered.contains("transcript") || lowered.contains("captions") {
            stats.no_transcript += 1;
        } else {
            stats.failed += 1;
        }
        Ok(())
    }

    async fn notify(
        &self,
        recipient: &Option<String>,
        channel_title: &str,
        succeeded: bool,
        stats: &ChannelRunStats,
        error_message: Option<&str>,
    ) {
        let (Some(email), Some(to)) = (&self.email, recipient) else {
            return;
        };
        if let Err(e) = email
            .send_channel_report(to, channel_title, succeeded, stats, error_message)
            .await
        {
            warn!(to, error = %e, "completion email failed");
            self.sink.capture(
                "EMAIL",
                &e.to_string(),
                None,
                serde_json::json!({ "recipient": to }),
            );
        }
    }
}
