use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IngestError, Result};

/// Per-blob size cap (10 MiB), matching the container policy.
const MAX_BLOB_BYTES: usize = 10 * 1024 * 1024;

/// Filesystem-backed private container for transcript blobs.
///
/// Blobs live at `<video_id>/transcript.txt` under the configured root
/// and are immutable once written (writes overwrite whole files).
pub struct TranscriptBlobs {
    root: PathBuf,
}

impl TranscriptBlobs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Blob path for a video, as stored on the video row.
    pub fn blob_path(video_id: &str) -> String {
        format!("{video_id}/transcript.txt")
    }

    /// Write (overwrite) a transcript blob. Creates the container
    /// directory when missing. Returns the stored path.
    pub fn write(&self, video_id: &str, content: &str) -> Result<String> {
        validate_id(video_id)?;
        if content.len() > MAX_BLOB_BYTES {
            return Err(IngestError::BlobTooLarge {
                size: content.len(),
            });
        }

        let rel = Self::blob_path(video_id);
        let full = self.root.join(&rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)?;
        debug!(video_id, bytes = content.len(), "transcript blob written");
        Ok(rel)
    }

    /// Read a whole blob back as UTF-8 bytes.
    pub fn read_bytes(&self, rel_path: &str) -> Result<Vec<u8>> {
        validate_rel_path(rel_path)?;
        Ok(std::fs::read(self.root.join(rel_path))?)
    }

    /// Read one byte range of a blob as text. Used by retrieval to
    /// materialise a chunk's full text from its offsets.
    pub fn read_range(&self, rel_path: &str, offset: u64, length: u64) -> Result<String> {
        let bytes = self.read_bytes(rel_path)?;
        let start = (offset as usize).min(bytes.len());
        let end = (offset + length).min(bytes.len() as u64) as usize;
        Ok(String::from_utf8_lossy(&bytes[start..end]).into_owned())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn validate_id(video_id: &str) -> Result<()> {
    let ok = !video_id.is_empty()
        && video_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(IngestError::InvalidVideoId(video_id.to_string()))
    }
}

fn validate_rel_path(rel_path: &str) -> Result<()> {
    if rel_path.split('/').any(|part| part == "..") {
        return Err(IngestError::InvalidVideoId(rel_path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = TranscriptBlobs::new(dir.path());
        let path = blobs.write("abc123", "[00:00] hello\n").expect("write");
        assert_eq!(path, "abc123/transcript.txt");
        assert_eq!(blobs.read_bytes(&path).unwrap(), b"[00:00] hello\n");
    }

    #[test]
    fn write_overwrites_existing_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = TranscriptBlobs::new(dir.path());
        blobs.write("abc123", "old").unwrap();
        let path = blobs.write("abc123", "new").unwrap();
        assert_eq!(blobs.read_bytes(&path).unwrap(), b"new");
    }

    #[test]
    fn read_range_slices_by_byte_offsets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = TranscriptBlobs::new(dir.path());
        let path = blobs.write("v1", "[00:00] one\n[00:05] two\n").unwrap();
        assert_eq!(blobs.read_range(&path, 12, 12).unwrap(), "[00:05] two\n");
    }

    #[test]
    fn traversal_ids_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = TranscriptBlobs::new(dir.path());
        assert!(blobs.write("../escape", "x").is_err());
        assert!(blobs.read_bytes("../../etc/passwd").is_err());
    }

    #[test]
    fn oversized_blobs_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blobs = TranscriptBlobs::new(dir.path());
        let big = "x".repeat(MAX_BLOB_BYTES + 1);
        assert!(matches!(
            blobs.write("abc123", &big),
            Err(IngestError::BlobTooLarge { .. })
        ));
    }
}
