use rusqlite::{Connection, Result};

/// Initialise the channel queue table. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channel_queue (
            id                      TEXT PRIMARY KEY,
            channel_id              TEXT NOT NULL,
            requested_by            TEXT,
            requested_email         TEXT,
            status                  TEXT NOT NULL DEFAULT 'pending',
            priority                TEXT NOT NULL DEFAULT 'normal',
            retry_count             INTEGER NOT NULL DEFAULT 0,
            total_videos            INTEGER NOT NULL DEFAULT 0,
            videos_processed        INTEGER NOT NULL DEFAULT 0,
            current_video_index     INTEGER NOT NULL DEFAULT 0,
            current_video_title     TEXT,
            started_at              TEXT,
            completed_at            TEXT,
            error_message           TEXT,
            estimated_completion_at TEXT,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_queue_status
            ON channel_queue(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_queue_channel
            ON channel_queue(channel_id, created_at DESC);",
    )
}
