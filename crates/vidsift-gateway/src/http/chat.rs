//! Streaming chat endpoints — POST /api/chat/stream (single video) and
//! POST /api/chat/channel/stream (whole channel).
//!
//! Auth and rate-limit failures are plain HTTP errors; once the SSE
//! stream is open, failures arrive as `{"type":"error"}` frames. Client
//! disconnects are observed through the closed frame channel and abandon
//! the turn server-side.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use vidsift_chat::{ChatSink, SseFrame};
use vidsift_core::types::RateAction;
use vidsift_providers::{ChatTurn, Role};

use crate::app::AppState;
use crate::auth;
use crate::error::ApiError;
use crate::ratelimit;

/// Frames buffered between the orchestrator and the HTTP response.
const FRAME_BUFFER: usize = 32;

#[derive(Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoChatRequest {
    pub messages: Vec<IncomingMessage>,
    pub video_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelChatRequest {
    pub messages: Vec<IncomingMessage>,
    pub channel_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Frame sender backed by the response channel. The receiver is owned by
/// the SSE body; when the client drops the connection the channel closes
/// and both signals flip.
struct SseSink {
    tx: mpsc::Sender<SseFrame>,
}

#[async_trait]
impl ChatSink for SseSink {
    async fn send_frame(&self, frame: SseFrame) -> bool {
        self.tx.send(frame).await.is_ok()
    }

    fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

pub async fn video_stream(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<VideoChatRequest>,
) -> Response {
    if req.video_id.trim().is_empty() {
        return ApiError::bad_request("videoId is required").into_response();
    }
    let video_id = req.video_id.trim().to_string();
    start_stream(state, peer, headers, req.messages, req.session_id, move |chat, turns, session, user, sink| async move {
        chat.stream_video_chat(turns, &video_id, session, user, &sink).await;
    })
}

pub async fn channel_stream(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ChannelChatRequest>,
) -> Response {
    if req.channel_id.trim().is_empty() {
        return ApiError::bad_request("channelId is required").into_response();
    }
    let channel_id = req.channel_id.trim().to_string();
    start_stream(state, peer, headers, req.messages, req.session_id, move |chat, turns, session, user, sink| async move {
        chat.stream_channel_chat(turns, &channel_id, session, user, &sink).await;
    })
}

/// Shared front half of both chat endpoints: auth, rate limit, message
/// conversion, then the SSE plumbing around the orchestrator call.
fn start_stream<F, Fut>(
    state: Arc<AppState>,
    peer: SocketAddr,
    headers: HeaderMap,
    messages: Vec<IncomingMessage>,
    session_id: Option<String>,
    run: F,
) -> Response
where
    F: FnOnce(
            Arc<vidsift_chat::ChatOrchestrator>,
            Vec<ChatTurn>,
            Option<String>,
            Option<String>,
            SseSink,
        ) -> Fut
        + Send
        + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }
    let user = match ratelimit::enforce(&state, &headers, &peer, RateAction::Chat) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let turns: Vec<ChatTurn> = messages
        .into_iter()
        .map(|m| ChatTurn {
            role: if m.role == "assistant" {
                Role::Assistant
            } else {
                Role::User
            },
            content: m.content,
        })
        .collect();

    let (tx, rx) = mpsc::channel::<SseFrame>(FRAME_BUFFER);
    let chat = Arc::clone(&state.chat);
    tokio::spawn(run(chat, turns, session_id, user.id, SseSink { tx }));

    let stream = ReceiverStream::new(rx).map(|frame| {
        let json = serde_json::to_string(&frame).unwrap_or_else(|_| {
            r#"{"type":"error","error":"frame serialization failed"}"#.to_string()
        });
        Ok::<Event, Infallible>(Event::default().data(json))
    });
    Sse::new(stream).into_response()
}
