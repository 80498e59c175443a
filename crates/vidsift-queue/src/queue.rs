use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use vidsift_core::types::{Priority, QueueStatus};

use crate::db::init_db;
use crate::error::{QueueError, Result};

/// Completed rows are garbage-collected after this many days.
const GC_AFTER_DAYS: i64 = 7;
/// Failed rows are retried at most this many times.
const MAX_RETRIES: u32 = 3;
/// Per-video processing estimate used for the completion ETA.
const ETA_SECS_PER_VIDEO: i64 = 30;

/// One persisted unit of channel ingest work.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub channel_id: String,
    pub requested_by: Option<String>,
    pub requested_email: Option<String>,
    pub status: QueueStatus,
    pub priority: Priority,
    pub retry_count: u32,
    pub total_videos: u32,
    pub videos_processed: u32,
    pub current_video_index: u32,
    pub current_video_title: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub estimated_completion_at: Option<String>,
    pub created_at: String,
}

/// Result of an enqueue attempt. `success` is false when an equivalent
/// pending/processing row already exists.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueOutcome {
    pub success: bool,
    pub queue_id: String,
    pub status: QueueStatus,
    pub message: String,
    pub position: Option<u32>,
}

/// Row counts by status for the monitor surface.
#[derive(Debug, Clone, Serialize, Default)]
pub struct QueueCounts {
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

/// Durable channel ingest queue over SQLite.
pub struct QueueManager {
    db: Mutex<Connection>,
}

impl QueueManager {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Enqueue a channel for ingest. Idempotent: a live (pending or
    /// processing) row for the same channel short-circuits.
    pub fn enqueue_channel(
        &self,
        channel_id: &str,
        requested_by: Option<&str>,
        requested_email: Option<&str>,
        priority: Priority,
    ) -> Result<EnqueueOutcome> {
        if let Some(existing) = self.live_item_for_channel(channel_id)? {
            let position = self.position(&existing.id)?;
            return Ok(EnqueueOutcome {
                success: false,
                queue_id: existing.id,
                status: existing.status,
                message: format!("channel is already {}", existing.status),
                position,
            });
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO channel_queue
                 (id, channel_id, requested_by, requested_email, status, priority,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?6)",
                rusqlite::params![id, channel_id, requested_by, requested_email,
                    priority.to_string(), now],
            )?;
        }
        let position = self.position(&id)?;
        info!(queue_id = %id, channel_id, %priority, "channel enqueued");
        Ok(EnqueueOutcome {
            success: true,
            queue_id: id,
            status: QueueStatus::Pending,
            message: "queued for processing".to_string(),
            position,
        })
    }

    pub fn get(&self, qid: &str) -> Result<QueueItem> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("{SELECT_ITEM} WHERE id = ?1"),
            [qid],
            row_to_item,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => QueueError::NotFound(qid.to_string()),
            other => other.into(),
        })
    }

    /// Most recent queue row for a channel, any status.
    pub fn latest_for_channel(&self, channel_id: &str) -> Result<Option<QueueItem>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{SELECT_ITEM} WHERE channel_id = ?1 ORDER BY created_at DESC LIMIT 1"),
            [channel_id],
            row_to_item,
        ) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn live_item_for_channel(&self, channel_id: &str) -> Result<Option<QueueItem>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!(
                "{SELECT_ITEM} WHERE channel_id = ?1 AND status IN ('pending', 'processing')
                 ORDER BY created_at LIMIT 1"
            ),
            [channel_id],
            row_to_item,
        ) {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 1-based position among pending rows; `None` when not pending.
    pub fn position(&self, qid: &str) -> Result<Option<u32>> {
        let item = self.get(qid)?;
        if item.status != QueueStatus::Pending {
            return Ok(None);
        }
        let db = self.db.lock().unwrap();
        let ahead: u32 = db.query_row(
            "SELECT COUNT(*) FROM channel_queue
             WHERE status = 'pending' AND created_at < ?1",
            [&item.created_at],
            |row| row.get(0),
        )?;
        Ok(Some(ahead + 1))
    }

    /// Oldest pending rows, up to `limit`.
    pub fn fetch_pending(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "{SELECT_ITEM} WHERE status = 'pending' ORDER BY created_at LIMIT ?1"
        ))?;
        let items = stmt
            .query_map([limit], row_to_item)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(items)
    }

    /// Transition `pending → processing` and stamp `started_at`. Returns
    /// false when the row was not pending (another worker got there first).
    pub fn begin_processing(&self, qid: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE channel_queue
             SET status = 'processing', started_at = ?2, updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![qid, now],
        )?;
        Ok(n == 1)
    }

    /// Record the video total and completion estimate for a run.
    pub fn set_totals(&self, qid: &str, total_videos: u32) -> Result<()> {
        let now = Utc::now();
        let eta = (now + chrono::Duration::seconds(ETA_SECS_PER_VIDEO * total_videos as i64))
            .to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE channel_queue
             SET total_videos = ?2, estimated_completion_at = ?3, updated_at = ?4
             WHERE id = ?1",
            rusqlite::params![qid, total_videos, eta, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record the video currently being worked (progress reporting).
    pub fn update_progress(&self, qid: &str, index: u32, title: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE channel_queue
             SET current_video_index = ?2, current_video_title = ?3, updated_at = ?4
             WHERE id = ?1",
            rusqlite::params![qid, index, title, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Transition `processing → completed`.
    pub fn complete(&self, qid: &str, videos_processed: u32) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE channel_queue
             SET status = 'completed', videos_processed = ?2, completed_at = ?3,
                 updated_at = ?3
             WHERE id = ?1",
            rusqlite::params![qid, videos_processed, now],
        )?;
        Ok(())
    }

    /// Transition to `failed`, retaining the retry counter.
    pub fn fail(&self, qid: &str, error_message: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE channel_queue
             SET status = 'failed', error_message = ?2, completed_at = ?3, updated_at = ?3
             WHERE id = ?1",
            rusqlite::params![qid, error_message, now],
        )?;
        Ok(())
    }

    /// Reset up to `limit` failed rows with remaining retries back to
    /// pending, bumping `retry_count` and clearing the error.
    pub fn reset_failed(&self, limit: usize) -> Result<usize> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE channel_queue
             SET status = 'pending', retry_count = retry_count + 1,
                 error_message = NULL, updated_at = ?2
             WHERE id IN (
                 SELECT id FROM channel_queue
                 WHERE status = 'failed' AND retry_count < ?3
                 ORDER BY created_at LIMIT ?1
             )",
            rusqlite::params![limit, now, MAX_RETRIES],
        )?;
        if n > 0 {
            debug!(count = n, "reset failed queue items for retry");
        }
        Ok(n)
    }

    /// Delete completed rows older than 7 days.
    pub fn gc_completed(&self) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::days(GC_AFTER_DAYS)).to_rfc3339();
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "DELETE FROM channel_queue WHERE status = 'completed' AND completed_at < ?1",
            [&cutoff],
        )?;
        Ok(n)
    }

    /// Row counts by status.
    pub fn counts(&self) -> Result<QueueCounts> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT status, COUNT(*) FROM channel_queue GROUP BY status")?;
        let mut counts = QueueCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows.filter_map(|r| r.ok()) {
            match row.0.as_str() {
                "pending" => counts.pending = row.1,
                "processing" => counts.processing = row.1,
                "completed" => counts.completed = row.1,
                "failed" => counts.failed = row.1,
                _ => {}
            }
        }
        Ok(counts)
    }
}

const SELECT_ITEM: &str = "SELECT id, channel_id, requested_by, requested_email, status,
    priority, retry_count, total_videos, videos_processed, current_video_index,
    current_video_title, started_at, completed_at, error_message,
    estimated_completion_at, created_at FROM channel_queue";

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
    let status_str: String = row.get(4)?;
    let priority_str: String = row.get(5)?;
    Ok(QueueItem {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        requested_by: row.get(2)?,
        requested_email: row.get(3)?,
        status: status_str.parse().unwrap_or(QueueStatus::Pending),
        priority: priority_str.parse().unwrap_or_default(),
        retry_count: row.get(6)?,
        total_videos: row.get(7)?,
        videos_processed: row.get(8)?,
        current_video_index: row.get(9)?,
        current_video_title: row.get(10)?,
        started_at: row.get(11)?,
        completed_at: row.get(12)?,
        error_message: row.get(13)?,
        estimated_completion_at: row.get(14)?,
        created_at: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> QueueManager {
        QueueManager::new(Connection::open_in_memory().expect("open db")).expect("init")
    }

    #[test]
    fn second_enqueue_returns_existing_row() {
        let q = queue();
        let first = q
            .enqueue_channel("UC123", Some("u1"), None, Priority::Normal)
            .unwrap();
        assert!(first.success);
        assert_eq!(first.position, Some(1));

        let second = q
            .enqueue_channel("UC123", Some("u1"), None, Priority::Normal)
            .unwrap();
        assert!(!second.success);
        assert_eq!(second.queue_id, first.queue_id);

        // Only one pending row exists.
        assert_eq!(q.counts().unwrap().pending, 1);
    }

    #[test]
    fn completion_allows_reenqueue() {
        let q = queue();
        let first = q.enqueue_channel("UC1", None, None, Priority::High).unwrap();
        assert!(q.begin_processing(&first.queue_id).unwrap());
        q.complete(&first.queue_id, 4).unwrap();

        let second = q.enqueue_channel("UC1", None, None, Priority::Normal).unwrap();
        assert!(second.success);
        assert_ne!(second.queue_id, first.queue_id);
    }

    #[test]
    fn position_counts_earlier_pending_rows() {
        let q = queue();
        let a = q.enqueue_channel("UCa", None, None, Priority::Normal).unwrap();
        let b = q.enqueue_channel("UCb", None, None, Priority::Normal).unwrap();
        assert_eq!(q.position(&a.queue_id).unwrap(), Some(1));
        assert_eq!(q.position(&b.queue_id).unwrap(), Some(2));

        assert!(q.begin_processing(&a.queue_id).unwrap());
        assert_eq!(q.position(&a.queue_id).unwrap(), None);
        assert_eq!(q.position(&b.queue_id).unwrap(), Some(1));
    }

    #[test]
    fn begin_processing_is_single_winner() {
        let q = queue();
        let item = q.enqueue_channel("UC2", None, None, Priority::Normal).unwrap();
        assert!(q.begin_processing(&item.queue_id).unwrap());
        assert!(!q.begin_processing(&item.queue_id).unwrap());
    }

    #[test]
    fn reset_failed_respects_retry_budget() {
        let q = queue();
        let item = q.enqueue_channel("UC3", None, None, Priority::Normal).unwrap();
        q.begin_processing(&item.queue_id).unwrap();

        for expected_retry in 1..=MAX_RETRIES {
            q.fail(&item.queue_id, "boom").unwrap();
            let reset = q.reset_failed(5).unwrap();
            assert_eq!(reset, 1);
            let row = q.get(&item.queue_id).unwrap();
            assert_eq!(row.status, QueueStatus::Pending);
            assert_eq!(row.retry_count, expected_retry);
            assert!(row.error_message.is_none());
        }

        // Fourth failure: retry budget exhausted.
        q.fail(&item.queue_id, "boom").unwrap();
        assert_eq!(q.reset_failed(5).unwrap(), 0);
        assert_eq!(q.get(&item.queue_id).unwrap().status, QueueStatus::Failed);
    }

    #[test]
    fn gc_only_touches_old_completed_rows() {
        let q = queue();
        let done = q.enqueue_channel("UCold", None, None, Priority::Normal).unwrap();
        q.begin_processing(&done.queue_id).unwrap();
        q.complete(&done.queue_id, 1).unwrap();
        // Backdate completion past the GC horizon.
        {
            let db = q.db.lock().unwrap();
            let old = (Utc::now() - chrono::Duration::days(8)).to_rfc3339();
            db.execute(
                "UPDATE channel_queue SET completed_at = ?1 WHERE id = ?2",
                rusqlite::params![old, done.queue_id],
            )
            .unwrap();
        }
        q.enqueue_channel("UCnew", None, None, Priority::Normal).unwrap();

        assert_eq!(q.gc_completed().unwrap(), 1);
        assert_eq!(q.counts().unwrap().pending, 1);
    }
}
