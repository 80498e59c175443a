use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Retry attempts on upstream throttling.
const MAX_ATTEMPTS: u32 = 3;
/// Initial backoff; doubles per attempt.
const BACKOFF_BASE_SECS: u64 = 5;

/// Why a transcript could not be fetched. Callers branch on this: a video
/// without captions is recorded and skipped, a throttled fetch is retried
/// later, a network failure is transient.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("no captions available for this video")]
    NoTranscript,

    #[error("video is private, deleted, or region-restricted")]
    Unavailable,

    #[error("network failure: {0}")]
    Network(String),

    #[error("transcript source rate limited after retries")]
    RateLimited,

    #[error("transcript fetch failed: {0}")]
    Unknown(String),
}

/// One caption cue, times floored to whole seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptSegment {
    pub start_seconds: u32,
    pub end_seconds: u32,
    pub text: String,
}

/// Retriable timed-text retrieval for a video.
pub struct TranscriptFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl TranscriptFetcher {
    pub fn new() -> Self {
        Self::with_base_url("https://www.youtube.com".to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: crate::http_client(),
            base_url,
        }
    }

    /// Fetch the English timed-text track for `video_id`. Retries up to
    /// three times with doubling backoff on 429.
    pub async fn fetch(&self, video_id: &str) -> Result<Vec<TranscriptSegment>, TranscriptError> {
        let url = format!(
            "{}/api/timedtext?v={}&lang=en&fmt=json3",
            self.base_url, video_id
        );

        let mut backoff = BACKOFF_BASE_SECS;
        for attempt in 1..=MAX_ATTEMPTS {
            let resp = match self.client.get(&url).send().await {
                Ok(r) => r,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    return Err(TranscriptError::Network(e.to_string()));
                }
                Err(e) => return Err(TranscriptError::Unknown(e.to_string())),
            };

            let status = resp.status().as_u16();
            match status {
                429 => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(TranscriptError::RateLimited);
                    }
                    warn!(video_id, attempt, backoff, "timed-text throttled; backing off");
                    tokio::time::sleep(Duration::from_secs(backoff)).await;
                    backoff *= 2;
                    continue;
                }
                403 | 404 | 410 => return Err(TranscriptError::Unavailable),
                s if s >= 400 => {
                    return Err(TranscriptError::Unknown(format!(
                        "timed-text returned status {s}"
                    )));
                }
                _ => {}
            }

            let body = resp
                .text()
                .await
                .map_err(|e| TranscriptError::Network(e.to_string()))?;
            // An empty body means the track list exists but captions are off.
            if body.trim().is_empty() {
                return Err(TranscriptError::NoTranscript);
            }

            let segments = parse_json3(&body)?;
            debug!(video_id, segments = segments.len(), "transcript fetched");
            return Ok(segments);
        }
        Err(TranscriptError::RateLimited)
    }
}

impl Default for TranscriptFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the json3 timed-text payload into cues. Events without renderable
/// text (style windows, newline placeholders) are skipped.
fn parse_json3(body: &str) -> Result<Vec<TranscriptSegment>, TranscriptError> {
    let track: Json3Track =
        serde_json::from_str(body).map_err(|e| TranscriptError::Unknown(e.to_string()))?;

    let mut segments = Vec::new();
    for event in track.events.unwrap_or_default() {
        let Some(start_ms) = event.t_start_ms else {
            continue;
        };
        let text: String = event
            .segs
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| s.utf8)
            .collect::<Vec<_>>()
            .join("");
        let text = text.replace('\n', " ").trim().to_string();
        if text.is_empty() {
            continue;
        }
        let duration_ms = event.d_duration_ms.unwrap_or(0);
        segments.push(TranscriptSegment {
            start_seconds: (start_ms / 1000) as u32,
            end_seconds: ((start_ms + duration_ms) / 1000) as u32,
            text,
        });
    }

    if segments.is_empty() {
        return Err(TranscriptError::NoTranscript);
    }
    Ok(segments)
}

#[derive(Deserialize)]
struct Json3Track {
    events: Option<Vec<Json3Event>>,
}

#[derive(Deserialize)]
struct Json3Event {
    #[serde(rename = "tStartMs")]
    t_start_ms: Option<u64>,
    #[serde(rename = "dDurationMs")]
    d_duration_ms: Option<u64>,
    segs: Option<Vec<Json3Seg>>,
}

#[derive(Deserialize)]
struct Json3Seg {
    utf8: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "events": [
            {"tStartMs": 0, "dDurationMs": 2500, "segs": [{"utf8": "Welcome back"}]},
            {"tStartMs": 2500, "dDurationMs": 1999, "segs": [{"utf8": "to the "}, {"utf8": "channel."}]},
            {"tStartMs": 4500, "segs": [{"utf8": "\n"}]},
            {"tStartMs": 5000, "dDurationMs": 3000, "segs": [{"utf8": "Today: lifetimes!"}]}
        ]
    }"#;

    #[test]
    fn parses_cues_and_floors_times() {
        let segments = parse_json3(FIXTURE).expect("parse");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].start_seconds, 0);
        assert_eq!(segments[0].end_seconds, 2);
        assert_eq!(segments[1].text, "to the channel.");
        // 2500 + 1999 = 4499ms floors to 4s
        assert_eq!(segments[1].end_seconds, 4);
        assert_eq!(segments[2].text, "Today: lifetimes!");
    }

    #[test]
    fn empty_events_mean_no_transcript() {
        assert!(matches!(
            parse_json3(r#"{"events": []}"#),
            Err(TranscriptError::NoTranscript)
        ));
    }

    #[test]
    fn whitespace_only_cues_are_skipped() {
        let body = r#"{"events":[{"tStartMs":0,"segs":[{"utf8":"\n"}]}]}"#;
        assert!(matches!(
            parse_json3(body),
            Err(TranscriptError::NoTranscript)
        ));
    }
}
