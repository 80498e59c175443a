use std::sync::Mutex;

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

use vidsift_core::types::ChannelStatus;
use vidsift_providers::VideoInfo;

use crate::chunker::Chunk;
use crate::db::init_db;
use crate::error::Result;

/// A channel row.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRecord {
    pub id: String,
    pub title: String,
    pub status: ChannelStatus,
    pub video_count: u32,
    pub last_indexed_at: Option<String>,
}

/// A video row.
#[derive(Debug, Clone, Serialize)]
pub struct VideoRecord {
    pub id: String,
    pub channel_id: Option<String>,
    pub title: String,
    pub description: String,
    pub duration_seconds: u32,
    pub published_at: Option<String>,
    pub transcript_cached: bool,
    pub chunks_processed: bool,
    pub processing_queued: bool,
    pub processing_error: Option<String>,
    pub transcript_blob_path: Option<String>,
}

/// A chunk row, decoded for retrieval.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: i64,
    pub video_id: String,
    pub video_title: Option<String>,
    pub chunk_index: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub byte_offset: u64,
    pub byte_length: u64,
    pub keywords: Vec<String>,
    pub preview: String,
    pub embedding: Option<Vec<f32>>,
}

/// Aggregate counts for the monitor surface.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CatalogCounts {
    pub channels: u32,
    pub ready_channels: u32,
    pub videos: u32,
    pub indexed_videos: u32,
    pub chunks: u32,
}

/// Store manager for channels, videos, and transcript chunks.
pub struct VideoCatalog {
    db: Mutex<Connection>,
}

impl VideoCatalog {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    // --- channels ----------------------------------------------------------

    /// Create the channel row if missing; update the title if it changed.
    pub fn upsert_channel(&self, id: &str, title: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO channels (id, title, status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)
             ON CONFLICT(id) DO UPDATE SET title = ?2, updated_at = ?3",
            rusqlite::params![id, title, now],
        )?;
        Ok(())
    }

    pub fn channel(&self, id: &str) -> Result<Option<ChannelRecord>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, title, status, video_count, last_indexed_at
             FROM channels WHERE id = ?1",
            [id],
            row_to_channel,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_channel_status(&self, id: &str, status: ChannelStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE channels SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, status.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Mark a channel ready after a successful run.
    pub fn finish_channel(&self, id: &str, video_count: u32) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE channels
             SET status = 'ready', video_count = ?2, last_indexed_at = ?3, updated_at = ?3
             WHERE id = ?1",
            rusqlite::params![id, video_count, now],
        )?;
        Ok(())
    }

    pub fn ready_channels(&self) -> Result<Vec<ChannelRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, title, status, video_count, last_indexed_at
             FROM channels WHERE status = 'ready' ORDER BY id",
        )?;
        let channels = stmt
            .query_map([], row_to_channel)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(channels)
    }

    // --- videos ------------------------------------------------------------

    /// Create a minimal placeholder row for a video known only by id.
    pub fn ensure_video(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO videos (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            rusqlite::params![id, now],
        )?;
        Ok(())
    }

    /// Upsert listing metadata for a video, preserving processing flags.
    pub fn upsert_video(&self, info: &VideoInfo, channel_id: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO videos
             (id, channel_id, title, description, duration_seconds, published_at,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                channel_id = COALESCE(?2, channel_id),
                title = ?3, description = ?4, duration_seconds = ?5,
                published_at = ?6, updated_at = ?7",
            rusqlite::params![
                info.id,
                channel_id,
                info.title,
                info.description,
                info.duration_seconds,
                info.published_at,
                now
            ],
        )?;
        Ok(())
    }

    pub fn video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("{SELECT_VIDEO} WHERE id = ?1"),
            [id],
            row_to_video,
        ) {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Flag a video for background processing.
    pub fn mark_video_queued(&self, id: &str) -> Result<()> {
        self.ensure_video(id)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE videos SET processing_queued = 1, updated_at = ?2 WHERE id = ?1",
            rusqlite::params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Queued videos with no cached transcript yet, oldest first.
    pub fn queued_video_ids(&self, limit: usize) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id FROM videos
             WHERE processing_queued = 1 AND transcript_cached = 0
             ORDER BY created_at LIMIT ?1",
        )?;
        let ids = stmt
            .query_map([limit], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Record pipeline success: transcript cached, chunks processed, blob
    /// path stored, error and queue flag cleared.
    pub fn mark_video_processed(&self, id: &str, blob_path: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE videos
             SET transcript_cached = 1, chunks_processed = 1, processing_queued = 0,
                 processing_error = NULL, transcript_blob_path = ?2, updated_at = ?3
             WHERE id = ?1",
            rusqlite::params![id, blob_path, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Record pipeline failure.
    pub fn mark_video_failed(&self, id: &str, error: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE videos
             SET transcript_cached = 0, processing_queued = 0, processing_error = ?2,
                 updated_at = ?3
             WHERE id = ?1",
            rusqlite::params![id, error, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Publish instant of the channel's newest known video.
    pub fn newest_video_published_at(&self, channel_id: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let newest: Option<String> = db
            .query_row(
                "SELECT MAX(published_at) FROM videos WHERE channel_id = ?1",
                [channel_id],
                |row| row.get(0),
            )
            .ok()
            .flatten();
        Ok(newest)
    }

    // --- chunks ------------------------------------------------------------

    /// Atomically replace a video's chunk set. Runs in one transaction so
    /// readers see either the old set or the new set, never a mixture.
    pub fn replace_chunks(
        &self,
        video_id: &str,
        chunks: &[Chunk],
        embeddings: &[Option<Vec<f32>>],
    ) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM transcript_chunks WHERE video_id = ?1",
            [video_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transcript_chunks
                 (video_id, chunk_index, start_time, end_time, byte_offset,
                  byte_length, keywords, preview, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for chunk in chunks {
                let vector = embeddings
                    .get(chunk.index as usize)
                    .and_then(|v| v.as_ref());
                let keywords = serde_json::to_string(&chunk.keywords)
                    .unwrap_or_else(|_| "[]".to_string());
                stmt.execute(rusqlite::params![
                    video_id,
                    chunk.index,
                    chunk.start_time,
                    chunk.end_time,
                    chunk.byte_offset,
                    chunk.byte_length,
                    keywords,
                    chunk.preview,
                    vector.map(|v| encode_embedding(v)),
                ])?;
            }
        }
        tx.commit()?;
        debug!(video_id, count = chunks.len(), "chunk set replaced");
        Ok(())
    }

    pub fn chunks_for_video(&self, video_id: &str) -> Result<Vec<ChunkRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT c.id, c.video_id, v.title, c.chunk_index, c.start_time, c.end_time,
                    c.byte_offset, c.byte_length, c.keywords, c.preview, c.embedding
             FROM transcript_chunks c
             JOIN videos v ON v.id = c.video_id
             WHERE c.video_id = ?1
             ORDER BY c.chunk_index",
        )?;
        let chunks = stmt
            .query_map([video_id], row_to_chunk)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(chunks)
    }

    /// Every chunk belonging to a channel's videos.
    pub fn chunks_for_channel(&self, channel_id: &str) -> Result<Vec<ChunkRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT c.id, c.video_id, v.title, c.chunk_index, c.start_time, c.end_time,
                    c.byte_offset, c.byte_length, c.keywords, c.preview, c.embedding
             FROM transcript_chunks c
             JOIN videos v ON v.id = c.video_id
             WHERE v.channel_id = ?1
             ORDER BY c.video_id, c.chunk_index",
        )?;
        let chunks = stmt
            .query_map([channel_id], row_to_chunk)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(chunks)
    }

    /// Aggregate counts for `/api/monitor/stats`.
    pub fn counts(&self) -> Result<CatalogCounts> {
        let db = self.db.lock().unwrap();
        let channels: u32 = db.query_row("SELECT COUNT(*) FROM channels", [], |r| r.get(0))?;
        let ready_channels: u32 = db.query_row(
            "SELECT COUNT(*) FROM channels WHERE status = 'ready'",
            [],
            |r| r.get(0),
        )?;
        let videos: u32 = db.query_row("SELECT COUNT(*) FROM videos", [], |r| r.get(0))?;
        let indexed_videos: u32 = db.query_row(
            "SELECT COUNT(*) FROM videos WHERE chunks_processed = 1",
            [],
            |r| r.get(0),
        )?;
        let chunks: u32 =
            db.query_row("SELECT COUNT(*) FROM transcript_chunks", [], |r| r.get(0))?;
        Ok(CatalogCounts {
            channels,
            ready_channels,
            videos,
            indexed_videos,
            chunks,
        })
    }
}

const SELECT_VIDEO: &str = "SELECT id, channel_id, title, description, duration_seconds,
    published_at, transcript_cached, chunks_processed, processing_queued,
    processing_error, transcript_blob_path FROM videos";

fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRecord> {
    let status_str: String = row.get(2)?;
    Ok(ChannelRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        status: status_str.parse().unwrap_or(ChannelStatus::Pending),
        video_count: row.get(3)?,
        last_indexed_at: row.get(4)?,
    })
}

fn row_to_video(row: &rusqlite::Row<'_>) -> rusqlite::Result<VideoRecord> {
    Ok(VideoRecord {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        duration_seconds: row.get(4)?,
        published_at: row.get(5)?,
        transcript_cached: row.get::<_, i64>(6)? != 0,
        chunks_processed: row.get::<_, i64>(7)? != 0,
        processing_queued: row.get::<_, i64>(8)? != 0,
        processing_error: row.get(9)?,
        transcript_blob_path: row.get(10)?,
    })
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let keywords_json: String = row.get(8)?;
    let embedding_blob: Option<Vec<u8>> = row.get(10)?;
    Ok(ChunkRecord {
        id: row.get(0)?,
        video_id: row.get(1)?,
        video_title: row.get(2)?,
        chunk_index: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        byte_offset: row.get::<_, i64>(6)? as u64,
        byte_length: row.get::<_, i64>(7)? as u64,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        preview: row.get(9)?,
        embedding: embedding_blob.map(|b| decode_embedding(&b)),
    })
}

/// Embeddings are stored as little-endian f32 bytes.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_segments;
    use vidsift_providers::TranscriptSegment;

    fn catalog() -> VideoCatalog {
        VideoCatalog::new(Connection::open_in_memory().expect("open db")).expect("init")
    }

    fn sample_chunks() -> Vec<Chunk> {
        let sentence = "word ".repeat(70) + "done.";
        let segments: Vec<TranscriptSegment> = (0..6)
            .map(|i| TranscriptSegment {
                start_seconds: i * 10,
                end_seconds: i * 10 + 9,
                text: sentence.clone(),
            })
            .collect();
        chunk_segments(&segments)
    }

    #[test]
    fn embedding_roundtrips_through_bytes() {
        let vector = vec![0.25f32, -1.5, 3.125];
        assert_eq!(decode_embedding(&encode_embedding(&vector)), vector);
    }

    #[test]
    fn replace_chunks_swaps_the_whole_set() {
        let cat = catalog();
        cat.ensure_video("vid1").unwrap();
        let chunks = sample_chunks();
        let embeddings: Vec<Option<Vec<f32>>> =
            chunks.iter().map(|_| Some(vec![1.0, 0.0])).collect();

        cat.replace_chunks("vid1", &chunks, &embeddings).unwrap();
        assert_eq!(cat.chunks_for_video("vid1").unwrap().len(), chunks.len());

        // Replacing with a shorter set leaves no stale rows behind.
        let fewer = &chunks[..1];
        cat.replace_chunks("vid1", fewer, &embeddings[..1]).unwrap();
        let stored = cat.chunks_for_video("vid1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].chunk_index, 0);
        assert_eq!(stored[0].embedding, Some(vec![1.0, 0.0]));
    }

    #[test]
    fn null_embeddings_survive_storage() {
        let cat = catalog();
        cat.ensure_video("vid2").unwrap();
        let chunks = sample_chunks();
        let embeddings: Vec<Option<Vec<f32>>> = chunks.iter().map(|_| None).collect();
        cat.replace_chunks("vid2", &chunks, &embeddings).unwrap();
        assert!(cat
            .chunks_for_video("vid2")
            .unwrap()
            .iter()
            .all(|c| c.embedding.is_none()));
    }

    #[test]
    fn queued_ids_exclude_cached_videos() {
        let cat = catalog();
        cat.mark_video_queued("a").unwrap();
        cat.mark_video_queued("b").unwrap();
        cat.mark_video_processed("a", "a/transcript.txt").unwrap();
        assert_eq!(cat.queued_video_ids(5).unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn failure_records_error_and_clears_cached_flag() {
        let cat = catalog();
        cat.ensure_video("v").unwrap();
        cat.mark_video_failed("v", "no captions available for this video")
            .unwrap();
        let video = cat.video("v").unwrap().expect("row");
        assert!(!video.transcript_cached);
        assert!(video
            .processing_error
            .as_deref()
            .unwrap()
            .contains("captions"));
    }

    #[test]
    fn channel_lifecycle_reaches_ready() {
        let cat = catalog();
        cat.upsert_channel("UC1", "Rust Channel").unwrap();
        cat.set_channel_status("UC1", ChannelStatus::Processing).unwrap();
        cat.finish_channel("UC1", 4).unwrap();
        let channel = cat.channel("UC1").unwrap().expect("row");
        assert_eq!(channel.status, ChannelStatus::Ready);
        assert_eq!(channel.video_count, 4);
        assert!(channel.last_indexed_at.is_some());
        assert_eq!(cat.ready_channels().unwrap().len(), 1);
    }
}
