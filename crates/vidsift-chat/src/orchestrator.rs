use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vidsift_cache::{cache_key, CacheStore, DEFAULT_TTL_SECS};
use vidsift_core::types::Citation;
use vidsift_errors::ErrorSink;
use vidsift_ingest::VideoCatalog;
use vidsift_providers::{ChatTurn, LlmClient, Role, StreamEvent};
use vidsift_search::{RetrievalEngine, RetrievedChunk};

use crate::citations::{extract_citations, merge_citations};
use crate::prompt;
use crate::sink::{ChatSink, SseFrame};
use crate::store::ChatStore;

/// Chunks retrieved per chat turn.
const RETRIEVAL_K: usize = 10;
/// Characters of chunk text kept in a context citation.
const CITATION_EXCERPT_CHARS: usize = 150;
/// Buffered deltas between the LLM reader task and the orchestrator.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// What a chat turn is grounded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    Video(String),
    Channel(String),
}

impl ChatTarget {
    pub fn id(&self) -> &str {
        match self {
            ChatTarget::Video(id) | ChatTarget::Channel(id) => id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ChatTarget::Video(_) => "video",
            ChatTarget::Channel(_) => "channel",
        }
    }
}

/// Cached answer for a repeated question against the same target.
#[derive(Serialize, Deserialize)]
struct CachedAnswer {
    answer: String,
    citations: Vec<Citation>,
}

enum StreamOutcome {
    Completed(String),
    Cancelled,
    Errored(String),
}

/// Composes retrieved context into a grounded prompt, streams the model's
/// answer to a sink, and persists the finished turn.
pub struct ChatOrchestrator {
    store: Arc<ChatStore>,
    search: Arc<RetrievalEngine>,
    catalog: Arc<VideoCatalog>,
    llm: Arc<LlmClient>,
    cache: Arc<CacheStore>,
    errors: Arc<ErrorSink>,
    /// stream id -> cancellation flag. An entry exists while the stream is
    /// active; cancelling flips the token and the pump stops at the next
    /// delta.
    streams: DashMap<String, CancellationToken>,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<ChatStore>,
        search: Arc<RetrievalEngine>,
        catalog: Arc<VideoCatalog>,
        llm: Arc<LlmClient>,
        cache: Arc<CacheStore>,
        errors: Arc<ErrorSink>,
    ) -> Self {
        Self {
            store,
            search,
            catalog,
            llm,
            cache,
            errors,
            streams: DashMap::new(),
        }
    }

    pub async fn stream_video_chat(
        &self,
        messages: Vec<ChatTurn>,
        video_id: &str,
        session_id: Option<String>,
        user_id: Option<String>,
        sink: &dyn ChatSink,
    ) {
        self.stream_chat(
            messages,
            ChatTarget::Video(video_id.to_string()),
            session_id,
            user_id,
            sink,
        )
        .await;
    }

    pub async fn stream_channel_chat(
        &self,
        messages: Vec<ChatTurn>,
        channel_id: &str,
        session_id: Option<String>,
        user_id: Option<String>,
        sink: &dyn ChatSink,
    ) {
        self.stream_chat(
            messages,
            ChatTarget::Channel(channel_id.to_string()),
            session_id,
            user_id,
            sink,
        )
        .await;
    }

    /// Cancel an active stream. No further content frames are emitted for
    /// this id once the token is flipped.
    pub fn cancel_stream(&self, stream_id: &str) -> bool {
        match self.streams.get(stream_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of streams currently active, for the monitor surface.
    pub fn active_stream_count(&self) -> usize {
        self.streams.len()
    }

    async fn stream_chat(
        &self,
        messages: Vec<ChatTurn>,
        target: ChatTarget,
        session_id: Option<String>,
        user_id: Option<String>,
        sink: &dyn ChatSink,
    ) {
        // 1. Nothing to answer without a user message.
        let Some(last_user) = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
        else {
            sink.send_frame(SseFrame::done(Vec::new())).await;
            return;
        };

        let session = match self.store.get_or_create_session(
            session_id.as_deref(),
            user_id.as_deref(),
            &target,
            &last_user,
        ) {
            Ok(session) => session,
            Err(e) => {
                sink.send_frame(SseFrame::error(e.to_string())).await;
                return;
            }
        };

        // 2. A repeated question is answered from cache without touching
        // retrieval or the model.
        let fingerprint = cache_key("chat", &[target.kind(), target.id(), &last_user]);
        if let Some(cached) = self.cached_answer(&fingerprint) {
            debug!(session_id = %session.id, "chat cache hit");
            if sink.send_frame(SseFrame::content(cached.answer.clone())).await {
                self.persist_turn(&session.id, &last_user, &cached.answer, &cached.citations);
                sink.send_frame(SseFrame::done(cached.citations)).await;
            }
            return;
        }

        // 3. Retrieve grounding context.
        let retrieval = match &target {
            ChatTarget::Video(id) => self.search.video_search(id, &last_user, RETRIEVAL_K).await,
            ChatTarget::Channel(id) => {
                self.search.channel_search(id, &last_user, RETRIEVAL_K).await
            }
        };
        let chunks = match retrieval {
            Ok(chunks) => chunks,
            Err(e) => {
                self.errors.capture(
                    "CHAT_RETRIEVAL",
                    &e.to_string(),
                    None,
                    serde_json::json!({ "target": target.id() }),
                );
                sink.send_frame(SseFrame::error(e.to_string())).await;
                return;
            }
        };

        // 4. Compose the system prompt.
        let system = match self.build_system_prompt(&target, &chunks) {
            Ok(system) => system,
            Err(e) => {
                sink.send_frame(SseFrame::error(e.to_string())).await;
                return;
            }
        };
        let context_citations: Vec<Citation> = chunks.iter().map(context_citation).collect();

        // 5. Stream the completion, watching for cancellation.
        let stream_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        self.streams.insert(stream_id.clone(), token.clone());

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let llm = Arc::clone(&self.llm);
        let turns = messages;
        let system_for_task = system;
        tokio::spawn(async move {
            if let Err(e) = llm.stream(&system_for_task, &turns, tx.clone()).await {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        });

        let outcome = pump_stream(rx, &token, sink).await;
        self.streams.remove(&stream_id);

        match outcome {
            StreamOutcome::Cancelled => {
                // Client is gone: abandon the turn, persist nothing.
                info!(stream_id = %stream_id, "chat stream cancelled mid-flight");
            }
            StreamOutcome::Errored(message) => {
                self.errors.capture(
                    "CHAT_LLM",
                    &message,
                    None,
                    serde_json::json!({ "target": target.id(), "session": session.id }),
                );
                sink.send_frame(SseFrame::error(message)).await;
            }
            StreamOutcome::Completed(answer) => {
                // 6. Citations: retrieval context plus timestamps the model
                // emitted itself.
                let citations = merge_citations(context_citations, extract_citations(&answer));

                // 7. Persist, cache, close.
                self.persist_turn(&session.id, &last_user, &answer, &citations);
                let cached = CachedAnswer {
                    answer,
                    citations: citations.clone(),
                };
                if let Ok(value) = serde_json::to_value(&cached) {
                    if let Err(e) = self.cache.set(&fingerprint, &value, DEFAULT_TTL_SECS) {
                        warn!(error = %e, "chat answer cache write failed");
                    }
                }
                sink.send_frame(SseFrame::done(citations)).await;
            }
        }
    }

    fn cached_answer(&self, fingerprint: &str) -> Option<CachedAnswer> {
        let value = self.cache.get(fingerprint).ok().flatten()?;
        serde_json::from_value(value).ok()
    }

    fn build_system_prompt(
        &self,
        target: &ChatTarget,
        chunks: &[RetrievedChunk],
    ) -> crate::error::Result<String> {
        match target {
            ChatTarget::Video(id) => {
                let video = self
                    .catalog
                    .video(id)?
                    .ok_or_else(|| crate::error::ChatError::NotFound(format!("video {id}")))?;
                let context = if chunks.is_empty() {
                    prompt::degenerate_context(&video.title, &video.description)
                } else {
                    prompt::build_video_context(chunks)
                };
                Ok(prompt::video_system_prompt(&video.title, &context))
            }
            ChatTarget::Channel(id) => {
                let channel = self
                    .catalog
                    .channel(id)?
                    .ok_or_else(|| crate::error::ChatError::NotFound(format!("channel {id}")))?;
                let context = if chunks.is_empty() {
                    prompt::degenerate_context(&channel.title, "")
                } else {
                    prompt::build_channel_context(chunks)
                };
                Ok(prompt::channel_system_prompt(&channel.title, &context))
            }
        }
    }

    fn persist_turn(
        &self,
        session_id: &str,
        user_content: &str,
        answer: &str,
        citations: &[Citation],
    ) {
        if let Err(e) = self
            .store
            .append_turn(session_id, user_content, answer, citations)
        {
            warn!(session_id, error = %e, "chat turn persistence failed");
            self.errors.capture(
                "CHAT_PERSIST",
                &e.to_string(),
                None,
                serde_json::json!({ "session": session_id }),
            );
        }
    }
}

/// Consume LLM events, forwarding deltas to the sink until the stream
/// finishes, errors, or is cancelled. Dropping the receiver on the way out
/// severs the provider task and its upstream connection.
async fn pump_stream(
    mut rx: mpsc::Receiver<StreamEvent>,
    token: &CancellationToken,
    sink: &dyn ChatSink,
) -> StreamOutcome {
    let mut answer = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::TextDelta { text } => {
                if token.is_cancelled() || sink.is_cancelled() {
                    return StreamOutcome::Cancelled;
                }
                answer.push_str(&text);
                if !sink.send_frame(SseFrame::content(text)).await {
                    return StreamOutcome::Cancelled;
                }
            }
            StreamEvent::Done => return StreamOutcome::Completed(answer),
            StreamEvent::Error { message } => return StreamOutcome::Errored(message),
        }
    }
    // Sender dropped without a Done — treat what we have as the answer.
    StreamOutcome::Completed(answer)
}

fn context_citation(chunk: &RetrievedChunk) -> Citation {
    Citation::Context {
        video_id: chunk.video_id.clone(),
        video_title: chunk.video_title.clone(),
        start_time: chunk.start_time,
        end_time: chunk.end_time,
        text: chunk.text.chars().take(CITATION_EXCERPT_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    struct TestSink {
        frames: Mutex<Vec<SseFrame>>,
        cancelled: AtomicBool,
    }

    impl TestSink {
        fn new() -> Self {
            Self {
                frames: Mutex::new(Vec::new()),
                cancelled: AtomicBool::new(false),
            }
        }

        fn content_count(&self) -> usize {
            self.frames
                .lock()
                .unwrap()
                .iter()
                .filter(|f| matches!(f, SseFrame::Content { .. }))
                .count()
        }
    }

    #[async_trait]
    impl ChatSink for TestSink {
        async fn send_frame(&self, frame: SseFrame) -> bool {
            self.frames.lock().unwrap().push(frame);
            !self.cancelled.load(Ordering::SeqCst)
        }

        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    fn test_orchestrator() -> ChatOrchestrator {
        use rusqlite::Connection;
        use vidsift_ingest::TranscriptBlobs;

        let open = || Connection::open_in_memory().expect("open db");
        let catalog = Arc::new(VideoCatalog::new(open()).expect("catalog"));
        let blobs = Arc::new(TranscriptBlobs::new(std::env::temp_dir().join("vidsift-test")));
        let embeddings = Arc::new(vidsift_providers::EmbeddingClient::new(
            "test-key".to_string(),
            "http://127.0.0.1:0".to_string(),
        ));
        ChatOrchestrator::new(
            Arc::new(ChatStore::new(open()).expect("chat store")),
            Arc::new(RetrievalEngine::new(
                Arc::clone(&catalog),
                Arc::clone(&blobs),
                Arc::clone(&embeddings),
            )),
            catalog,
            Arc::new(LlmClient::new(
                "test-key".to_string(),
                "http://127.0.0.1:0".to_string(),
            )),
            Arc::new(CacheStore::new(open()).expect("cache")),
            Arc::new(vidsift_errors::ErrorSink::new(open()).expect("sink")),
        )
    }

    #[tokio::test]
    async fn missing_user_message_closes_with_empty_done() {
        let chat = test_orchestrator();
        let sink = TestSink::new();
        chat.stream_video_chat(Vec::new(), "abc123", None, None, &sink)
            .await;
        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(
            matches!(&frames[0], SseFrame::Done { citations, done } if citations.is_empty() && *done)
        );
    }

    #[tokio::test]
    async fn cancel_stream_flips_only_registered_entries() {
        let chat = test_orchestrator();
        let token = CancellationToken::new();
        chat.streams.insert("stream-1".to_string(), token.clone());
        assert_eq!(chat.active_stream_count(), 1);

        assert!(chat.cancel_stream("stream-1"));
        assert!(token.is_cancelled());
        assert!(!chat.cancel_stream("stream-2"));
    }

    #[tokio::test]
    async fn no_content_frames_after_cancellation() {
        let sink = TestSink::new();
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(8);

        let pump = tokio::spawn({
            let token = token.clone();
            async move {
                let sink_ref: &dyn ChatSink = &sink;
                let outcome = pump_stream(rx, &token, sink_ref).await;
                (matches!(outcome, StreamOutcome::Cancelled), sink.content_count())
            }
        });

        tx.send(StreamEvent::TextDelta { text: "one ".to_string() })
            .await
            .unwrap();
        tx.send(StreamEvent::TextDelta { text: "two ".to_string() })
            .await
            .unwrap();
        // Give the pump a chance to forward the first deltas, then cancel.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();
        tx.send(StreamEvent::TextDelta { text: "three".to_string() })
            .await
            .unwrap();
        tx.send(StreamEvent::TextDelta { text: "four".to_string() })
            .await
            .unwrap();
        drop(tx);

        let (cancelled, frames_sent) = pump.await.unwrap();
        assert!(cancelled);
        // The post-cancellation deltas never reached the sink.
        assert!(frames_sent <= 2);
    }

    #[tokio::test]
    async fn sink_refusal_reads_as_cancellation() {
        let sink = TestSink::new();
        sink.cancelled.store(true, Ordering::SeqCst);
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::TextDelta { text: "x".to_string() })
            .await
            .unwrap();
        drop(tx);
        let outcome = pump_stream(rx, &token, &sink).await;
        assert!(matches!(outcome, StreamOutcome::Cancelled));
    }

    #[tokio::test]
    async fn completed_stream_accumulates_answer() {
        let sink = TestSink::new();
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::TextDelta { text: "Hello ".to_string() })
            .await
            .unwrap();
        tx.send(StreamEvent::TextDelta { text: "world".to_string() })
            .await
            .unwrap();
        tx.send(StreamEvent::Done).await.unwrap();
        drop(tx);
        match pump_stream(rx, &token, &sink).await {
            StreamOutcome::Completed(answer) => assert_eq!(answer, "Hello world"),
            _ => panic!("expected completion"),
        }
        assert_eq!(sink.content_count(), 2);
    }

    #[tokio::test]
    async fn upstream_error_is_reported() {
        let sink = TestSink::new();
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(8);
        tx.send(StreamEvent::Error { message: "rate limited".to_string() })
            .await
            .unwrap();
        drop(tx);
        assert!(matches!(
            pump_stream(rx, &token, &sink).await,
            StreamOutcome::Errored(m) if m == "rate limited"
        ));
    }
}
