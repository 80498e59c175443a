use rusqlite::{Connection, Result};

/// Initialise the catalog tables. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_channels_table(conn)?;
    create_videos_table(conn)?;
    create_chunks_table(conn)?;
    Ok(())
}

fn create_channels_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channels (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            video_count     INTEGER NOT NULL DEFAULT 0,
            last_indexed_at TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );",
    )
}

fn create_videos_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS videos (
            id                   TEXT PRIMARY KEY,
            channel_id           TEXT,
            title                TEXT NOT NULL DEFAULT '',
            description          TEXT NOT NULL DEFAULT '',
            duration_seconds     INTEGER NOT NULL DEFAULT 0,
            published_at         TEXT,
            transcript_cached    INTEGER NOT NULL DEFAULT 0,
            chunks_processed     INTEGER NOT NULL DEFAULT 0,
            processing_queued    INTEGER NOT NULL DEFAULT 0,
            processing_error     TEXT,
            transcript_blob_path TEXT,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_videos_channel
            ON videos(channel_id, published_at DESC);
        CREATE INDEX IF NOT EXISTS idx_videos_queued
            ON videos(processing_queued, transcript_cached, created_at);",
    )
}

fn create_chunks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS transcript_chunks (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id    TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_time  INTEGER NOT NULL,
            end_time    INTEGER NOT NULL,
            byte_offset INTEGER NOT NULL,
            byte_length INTEGER NOT NULL,
            keywords    TEXT NOT NULL,
            preview     TEXT NOT NULL,
            embedding   BLOB,
            UNIQUE(video_id, chunk_index)
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_video
            ON transcript_chunks(video_id, chunk_index);",
    )
}
