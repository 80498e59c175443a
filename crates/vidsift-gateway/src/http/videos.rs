//! Video endpoints — POST /api/videos/process and
//! GET /api/videos/:id/summary.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use vidsift_chat::ChatError;
use vidsift_core::types::{Priority, RateAction};
use vidsift_core::VidsiftError;

use crate::app::AppState;
use crate::auth;
use crate::error::ApiError;
use crate::ratelimit;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoRequest {
    pub video_id: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Flag a video for background processing. A fully indexed video is not
/// re-queued.
pub async fn process(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ProcessVideoRequest>,
) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }
    let video_id = req.video_id.trim();
    if video_id.is_empty() {
        return ApiError::bad_request("videoId is required").into_response();
    }

    if let Err(resp) = ratelimit::enforce(&state, &headers, &peer, RateAction::VideoUpload) {
        return resp;
    }

    match state.catalog.video(video_id) {
        Ok(Some(video)) if video.chunks_processed => {
            return Json(json!({
                "success": false,
                "videoId": video_id,
                "status": "completed",
                "message": "video is already processed",
            }))
            .into_response();
        }
        Err(e) => {
            return ApiError::from_kind(
                &VidsiftError::Store(e.to_string()),
                state.config.is_production(),
            )
            .into_response();
        }
        _ => {}
    }

    if let Err(e) = state.catalog.mark_video_queued(video_id) {
        return ApiError::from_kind(
            &VidsiftError::Store(e.to_string()),
            state.config.is_production(),
        )
        .into_response();
    }
    if req.priority.unwrap_or_default() == Priority::High {
        state.dispatcher.dispatch_video_now(video_id);
    }

    Json(json!({
        "success": true,
        "videoId": video_id,
        "status": "queued",
        "message": "video queued for processing",
    }))
    .into_response()
}

/// Cached or freshly generated summary. Inputs longer than 8 000
/// characters are summarised from a truncated transcript; the `truncated`
/// field reports the cut.
pub async fn summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }

    match state.summaries.video_summary(&id).await {
        Ok(summary) => Json(summary).into_response(),
        Err(ChatError::NotFound(message)) => ApiError::not_found(message).into_response(),
        Err(ChatError::Llm(e)) => ApiError::from_kind(
            &VidsiftError::UpstreamLlm(e.to_string()),
            state.config.is_production(),
        )
        .into_response(),
        Err(e) => ApiError::from_kind(
            &VidsiftError::Internal(e.to_string()),
            state.config.is_production(),
        )
        .into_response(),
    }
}
