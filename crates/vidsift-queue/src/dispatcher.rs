use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::queue::QueueManager;

/// Pending channel rows dispatched per 5 s tick.
const CHANNEL_BATCH: usize = 5;
/// Queued videos dispatched per 30 s tick.
const VIDEO_BATCH: usize = 5;
/// Failed rows reset per 5 min tick.
const RETRY_BATCH: usize = 5;

const CHANNEL_TICK_SECS: u64 = 5;
const VIDEO_TICK_SECS: u64 = 30;
const RETRY_TICK_SECS: u64 = 5 * 60;
const REFRESH_TICK_SECS: u64 = 6 * 3600;
const GC_TICK_SECS: u64 = 24 * 3600;

/// The work the dispatcher drives. Implemented by the assembly over the
/// pipelines and the catalog, so this crate never depends on them.
///
/// Implementations must be safe to invoke concurrently and re-entrantly:
/// at-most-once execution comes from the lock manager inside the
/// pipelines, not from the dispatcher.
#[async_trait]
pub trait QueueWorker: Send + Sync {
    /// Run the channel pipeline for one queue item.
    async fn process_channel_item(&self, qid: &str);

    /// Run the video pipeline for one video.
    async fn process_video(&self, video_id: &str);

    /// Videos flagged for processing that have no cached transcript yet,
    /// oldest first.
    async fn queued_video_ids(&self, limit: usize) -> Vec<String>;

    /// Poll ready channels for newly published videos and enqueue them.
    async fn refresh_ready_channels(&self);
}

/// Multi-interval tick engine over the queue.
pub struct Dispatcher {
    queue: Arc<QueueManager>,
    worker: Arc<dyn QueueWorker>,
    /// Tick name -> RFC 3339 of the last run, for /api/cron/status.
    last_runs: DashMap<&'static str, String>,
}

impl Dispatcher {
    pub fn new(queue: Arc<QueueManager>, worker: Arc<dyn QueueWorker>) -> Self {
        Self {
            queue,
            worker,
            last_runs: DashMap::new(),
        }
    }

    /// Immediately dispatch one queue item (high-priority enqueue path).
    /// Fire-and-forget; the pipeline's lock prevents double execution if a
    /// tick picks the same row up.
    pub fn dispatch_channel_now(&self, qid: &str) {
        let worker = Arc::clone(&self.worker);
        let qid = qid.to_string();
        tokio::spawn(async move {
            worker.process_channel_item(&qid).await;
        });
    }

    /// Immediately dispatch one video (high-priority enqueue path).
    pub fn dispatch_video_now(&self, video_id: &str) {
        let worker = Arc::clone(&self.worker);
        let video_id = video_id.to_string();
        tokio::spawn(async move {
            worker.process_video(&video_id).await;
        });
    }

    /// Snapshot of per-tick last-run timestamps.
    pub fn tick_status(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for entry in self.last_runs.iter() {
            map.insert(
                entry.key().to_string(),
                serde_json::Value::String(entry.value().clone()),
            );
        }
        serde_json::Value::Object(map)
    }

    /// Main loop. Runs until `shutdown` broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("queue dispatcher started");
        let mut channel_tick = tokio::time::interval(Duration::from_secs(CHANNEL_TICK_SECS));
        let mut video_tick = tokio::time::interval(Duration::from_secs(VIDEO_TICK_SECS));
        let mut retry_tick = tokio::time::interval(Duration::from_secs(RETRY_TICK_SECS));
        let mut refresh_tick = tokio::time::interval(Duration::from_secs(REFRESH_TICK_SECS));
        let mut gc_tick = tokio::time::interval(Duration::from_secs(GC_TICK_SECS));

        loop {
            tokio::select! {
                _ = channel_tick.tick() => self.dispatch_pending_channels(),
                _ = video_tick.tick() => self.dispatch_queued_videos().await,
                _ = retry_tick.tick() => self.reset_failed(),
                _ = refresh_tick.tick() => self.refresh_channels().await,
                _ = gc_tick.tick() => self.gc(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("queue dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn mark(&self, tick: &'static str) {
        self.last_runs.insert(tick, Utc::now().to_rfc3339());
    }

    fn dispatch_pending_channels(&self) {
        self.mark("channels");
        let items = match self.queue.fetch_pending(CHANNEL_BATCH) {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "pending fetch failed");
                return;
            }
        };
        for item in items {
            debug!(queue_id = %item.id, channel_id = %item.channel_id, "dispatching queue item");
            self.dispatch_channel_now(&item.id);
        }
    }

    async fn dispatch_queued_videos(&self) {
        self.mark("videos");
        for video_id in self.worker.queued_video_ids(VIDEO_BATCH).await {
            debug!(video_id = %video_id, "dispatching queued video");
            self.dispatch_video_now(&video_id);
        }
    }

    fn reset_failed(&self) {
        self.mark("retry");
        if let Err(e) = self.queue.reset_failed(RETRY_BATCH) {
            error!(error = %e, "failed-row reset errored");
        }
    }

    async fn refresh_channels(&self) {
        self.mark("refresh");
        self.worker.refresh_ready_channels().await;
    }

    fn gc(&self) {
        self.mark("gc");
        match self.queue.gc_completed() {
            Ok(n) if n > 0 => info!(count = n, "garbage-collected completed queue rows"),
            Err(e) => error!(error = %e, "queue GC failed"),
            _ => {}
        }
    }
}
