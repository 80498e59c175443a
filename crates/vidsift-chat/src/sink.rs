use async_trait::async_trait;
use serde::Serialize;

use vidsift_core::types::Citation;

/// One SSE frame, serialised exactly as the wire grammar requires:
/// `{"type":"content","content":…,"done":false}`,
/// `{"type":"done","citations":[…],"done":true}`, or
/// `{"type":"error","error":…}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SseFrame {
    Content { content: String, done: bool },
    Done { citations: Vec<Citation>, done: bool },
    Error { error: String },
}

impl SseFrame {
    pub fn content(delta: impl Into<String>) -> Self {
        SseFrame::Content {
            content: delta.into(),
            done: false,
        }
    }

    pub fn done(citations: Vec<Citation>) -> Self {
        SseFrame::Done {
            citations,
            done: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SseFrame::Error {
            error: message.into(),
        }
    }
}

/// Capability handed to the orchestrator by the transport layer. The HTTP
/// server adapts this onto an SSE response; tests capture frames directly.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Deliver one frame. Returns false when the client is gone — the
    /// orchestrator stops streaming and abandons the turn.
    async fn send_frame(&self, frame: SseFrame) -> bool;

    /// Whether the transport has observed a disconnect. Checked between
    /// model deltas.
    fn is_cancelled(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_frame_matches_wire_grammar() {
        let json = serde_json::to_string(&SseFrame::content("Hel")).unwrap();
        assert_eq!(json, r#"{"type":"content","content":"Hel","done":false}"#);
    }

    #[test]
    fn done_frame_matches_wire_grammar() {
        let json = serde_json::to_string(&SseFrame::done(vec![])).unwrap();
        assert_eq!(json, r#"{"type":"done","citations":[],"done":true}"#);
    }

    #[test]
    fn error_frame_matches_wire_grammar() {
        let json = serde_json::to_string(&SseFrame::error("boom")).unwrap();
        assert_eq!(json, r#"{"type":"error","error":"boom"}"#);
    }

    #[test]
    fn both_citation_shapes_serialise() {
        let frame = SseFrame::done(vec![
            Citation::Context {
                video_id: "abc".to_string(),
                video_title: Some("Intro".to_string()),
                start_time: 65,
                end_time: 90,
                text: "excerpt".to_string(),
            },
            Citation::Extracted {
                timestamp: "01:05".to_string(),
                seconds: 65,
                text: "…at [01:05] we see…".to_string(),
            },
        ]);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["citations"][0]["videoId"], "abc");
        assert_eq!(json["citations"][0]["startTime"], 65);
        assert_eq!(json["citations"][1]["timestamp"], "01:05");
        assert_eq!(json["citations"][1]["seconds"], 65);
    }
}
