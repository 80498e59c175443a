use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use vidsift_core::keywords::query_keywords;
use vidsift_ingest::{ChunkRecord, TranscriptBlobs, VideoCatalog};
use vidsift_providers::EmbeddingClient;

use crate::error::Result;

/// Boost for a keyword match on a chunk that also scored semantically.
const KEYWORD_BOOST: f32 = 0.3;
/// Base score for a keyword-only match (null or unscored vector).
const KEYWORD_BASE: f32 = 0.5;
/// Per-hit boost for query keywords found in the chunk's text preview
/// (video search only).
const PREVIEW_HIT_BOOST: f32 = 0.1;
/// Diversification never spreads across more than this many videos.
const DIVERSIFY_VIDEO_CAP: usize = 3;

/// One ranked search result with hydrated text.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub video_id: String,
    pub video_title: Option<String>,
    pub chunk_index: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub score: f32,
    pub text: String,
}

/// Hybrid retrieval over per-video and per-channel chunk corpora.
pub struct RetrievalEngine {
    catalog: Arc<VideoCatalog>,
    blobs: Arc<TranscriptBlobs>,
    embeddings: Arc<EmbeddingClient>,
}

impl RetrievalEngine {
    pub fn new(
        catalog: Arc<VideoCatalog>,
        blobs: Arc<TranscriptBlobs>,
        embeddings: Arc<EmbeddingClient>,
    ) -> Self {
        Self {
            catalog,
            blobs,
            embeddings,
        }
    }

    /// Rank one video's chunks against a query.
    pub async fn video_search(
        &self,
        video_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.catalog.chunks_for_video(video_id)?;
        let query_vector = self.embeddings.embed_query(query).await;
        let keywords = query_keywords(query);

        let mut scored = score_candidates(chunks, query_vector.as_deref(), &keywords, true);
        sort_ranked(&mut scored);
        scored.truncate(k);
        debug!(video_id, results = scored.len(), "video search ranked");
        Ok(self.hydrate(scored))
    }

    /// Rank chunks across a whole channel, diversified by video.
    pub async fn channel_search(
        &self,
        channel_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.catalog.chunks_for_channel(channel_id)?;
        let query_vector = self.embeddings.embed_query(query).await;
        let keywords = query_keywords(query);

        let mut scored = score_candidates(chunks, query_vector.as_deref(), &keywords, false);
        sort_ranked(&mut scored);
        let diversified = diversify(scored, k);
        debug!(channel_id, results = diversified.len(), "channel search ranked");
        Ok(self.hydrate(diversified))
    }

    /// Materialise each chunk's full text by slicing its video's blob at
    /// the recorded byte range. Falls back to the stored preview when the
    /// blob cannot be read.
    fn hydrate(&self, ranked: Vec<Scored>) -> Vec<RetrievedChunk> {
        let mut blob_paths: HashMap<String, Option<String>> = HashMap::new();

        ranked
            .into_iter()
            .map(|s| {
                let path = blob_paths
                    .entry(s.chunk.video_id.clone())
                    .or_insert_with(|| {
                        self.catalog
                            .video(&s.chunk.video_id)
                            .ok()
                            .flatten()
                            .and_then(|v| v.transcript_blob_path)
                    })
                    .clone();
                let text = path
                    .and_then(|p| {
                        self.blobs
                            .read_range(&p, s.chunk.byte_offset, s.chunk.byte_length)
                            .ok()
                    })
                    .unwrap_or_else(|| s.chunk.preview.clone());
                RetrievedChunk {
                    video_id: s.chunk.video_id,
                    video_title: s.chunk.video_title,
                    chunk_index: s.chunk.chunk_index,
                    start_time: s.chunk.start_time,
                    end_time: s.chunk.end_time,
                    score: s.score,
                    text,
                }
            })
            .collect()
    }
}

struct Scored {
    chunk: ChunkRecord,
    score: f32,
}

/// Cosine similarity of two vectors; zero when either has no magnitude or
/// the dimensions differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// True when any query keyword substring-matches any chunk keyword, in
/// either direction. Both sides are lowercased at extraction time.
fn keywords_match(query: &[String], chunk: &[String]) -> bool {
    query.iter().any(|q| {
        chunk
            .iter()
            .any(|c| c.contains(q.as_str()) || q.contains(c.as_str()))
    })
}

fn preview_hits(query: &[String], preview: &str) -> usize {
    let lowered = preview.to_lowercase();
    query.iter().filter(|q| lowered.contains(q.as_str())).count()
}

/// Merge semantic and keyword scores: cosine for every vectorised chunk;
/// keyword matches add 0.3 on top of a semantic score or stand on a 0.5
/// base for null-vector chunks; video search additionally pays 0.1 per
/// preview keyword hit.
fn score_candidates(
    chunks: Vec<ChunkRecord>,
    query_vector: Option<&[f32]>,
    keywords: &[String],
    with_preview_boost: bool,
) -> Vec<Scored> {
    chunks
        .into_iter()
        .map(|chunk| {
            let semantic = match (&chunk.embedding, query_vector) {
                (Some(vector), Some(query)) => cosine_similarity(vector, query),
                _ => 0.0,
            };
            let in_semantic_set = chunk.embedding.is_some() && query_vector.is_some();

            let mut score = semantic;
            if !keywords.is_empty() && keywords_match(keywords, &chunk.keywords) {
                // Outside the semantic set `semantic` is zero, so the base
                // stands alone.
                score += if in_semantic_set { KEYWORD_BOOST } else { KEYWORD_BASE };
            }
            if with_preview_boost {
                score += PREVIEW_HIT_BOOST * preview_hits(keywords, &chunk.preview) as f32;
            }
            Scored { chunk, score }
        })
        .collect()
}

/// Descending by score; ties break on earlier chunk index, then lower
/// video id.
fn sort_ranked(scored: &mut [Scored]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
            .then_with(|| a.chunk.video_id.cmp(&b.chunk.video_id))
    });
}

/// Cap per-video results at `ceil(k / min(videos, 3))`, then cut to `k`.
fn diversify(ranked: Vec<Scored>, k: usize) -> Vec<Scored> {
    let distinct: usize = {
        let mut videos: Vec<&str> = ranked.iter().map(|s| s.chunk.video_id.as_str()).collect();
        videos.sort_unstable();
        videos.dedup();
        videos.len()
    };
    if distinct == 0 {
        return Vec::new();
    }
    let per_video = k.div_ceil(distinct.min(DIVERSIFY_VIDEO_CAP));

    let mut taken: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(k);
    for scored in ranked {
        let used = taken.entry(scored.chunk.video_id.clone()).or_insert(0);
        if *used >= per_video {
            continue;
        }
        *used += 1;
        out.push(scored);
        if out.len() >= k {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(
        video_id: &str,
        index: u32,
        embedding: Option<Vec<f32>>,
        keywords: &[&str],
        preview: &str,
    ) -> ChunkRecord {
        ChunkRecord {
            id: index as i64,
            video_id: video_id.to_string(),
            video_title: None,
            chunk_index: index,
            start_time: index * 60,
            end_time: index * 60 + 59,
            byte_offset: 0,
            byte_length: 0,
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            preview: preview.to_string(),
            embedding,
        }
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&v, &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn keyword_boost_can_outrank_higher_semantic_score() {
        // A: semantic 0.80, no keyword hits. B: semantic 0.60, keyword
        // match plus 2 preview hits: 0.60 + 0.3 + 0.2 = 1.10.
        let query = vec![1.0f32, 0.0];
        let keywords = vec!["borrow".to_string(), "checker".to_string()];
        let chunks = vec![
            chunk("v1", 0, Some(vec![0.8, 0.6]), &[], "unrelated speech"),
            chunk(
                "v1",
                1,
                Some(vec![0.6, 0.8]),
                &["borrow", "checker"],
                "the borrow checker explained",
            ),
        ];
        let mut scored = score_candidates(chunks, Some(&query), &keywords, true);
        sort_ranked(&mut scored);
        assert_eq!(scored[0].chunk.chunk_index, 1);
        assert!((scored[0].score - 1.10).abs() < 1e-5);
        assert!((scored[1].score - 0.80).abs() < 1e-5);
    }

    #[test]
    fn null_vector_chunk_scores_keyword_base() {
        let query = vec![1.0f32, 0.0];
        let keywords = vec!["lifetimes".to_string()];
        let chunks = vec![chunk("v1", 0, None, &["lifetimes"], "")];
        let scored = score_candidates(chunks, Some(&query), &keywords, false);
        assert!((scored[0].score - KEYWORD_BASE).abs() < 1e-6);
    }

    #[test]
    fn substring_matching_works_both_directions() {
        assert!(keywords_match(
            &["own".to_string()],
            &["ownership".to_string()]
        ));
        assert!(keywords_match(
            &["ownership".to_string()],
            &["owner".to_string()]
        ));
        assert!(!keywords_match(
            &["lifetime".to_string()],
            &["borrow".to_string()]
        ));
    }

    #[test]
    fn diversification_caps_top_heavy_video() {
        // 7 hits on v1 ranked first, then v2 and v3. k=9 over 3 videos
        // caps each video at 3.
        let mut ranked: Vec<Scored> = Vec::new();
        for i in 0..7 {
            ranked.push(Scored {
                chunk: chunk("v1", i, None, &[], ""),
                score: 10.0 - i as f32 * 0.1,
            });
        }
        for i in 0..4 {
            ranked.push(Scored {
                chunk: chunk("v2", i, None, &[], ""),
                score: 5.0 - i as f32 * 0.1,
            });
        }
        for i in 0..4 {
            ranked.push(Scored {
                chunk: chunk("v3", i, None, &[], ""),
                score: 4.0 - i as f32 * 0.1,
            });
        }
        let out = diversify(ranked, 9);
        assert_eq!(out.len(), 9);
        for video in ["v1", "v2", "v3"] {
            assert_eq!(
                out.iter().filter(|s| s.chunk.video_id == video).count(),
                3,
                "per-video cap violated for {video}"
            );
        }
    }

    #[test]
    fn ties_break_on_chunk_index_then_video_id() {
        let mut scored = vec![
            Scored {
                chunk: chunk("vb", 2, None, &[], ""),
                score: 1.0,
            },
            Scored {
                chunk: chunk("vb", 1, None, &[], ""),
                score: 1.0,
            },
            Scored {
                chunk: chunk("va", 1, None, &[], ""),
                score: 1.0,
            },
        ];
        sort_ranked(&mut scored);
        assert_eq!(
            scored
                .iter()
                .map(|s| (s.chunk.video_id.as_str(), s.chunk.chunk_index))
                .collect::<Vec<_>>(),
            vec![("va", 1), ("vb", 1), ("vb", 2)]
        );
    }

    #[test]
    fn results_are_strictly_bounded_and_unique() {
        let ranked: Vec<Scored> = (0..20)
            .map(|i| Scored {
                chunk: chunk(if i % 2 == 0 { "v1" } else { "v2" }, i, None, &[], ""),
                score: 20.0 - i as f32,
            })
            .collect();
        let out = diversify(ranked, 5);
        assert!(out.len() <= 5);
        let mut ids: Vec<(String, u32)> = out
            .iter()
            .map(|s| (s.chunk.video_id.clone(), s.chunk.chunk_index))
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), out.len());
    }
}
