//! Channel ingest endpoints — POST /api/channels/process and
//! GET /api/channels/:id/status.

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

use vidsift_core::types::{Priority, RateAction};

use crate::app::AppState;
use crate::auth;
use crate::error::ApiError;
use crate::ratelimit;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessChannelRequest {
    pub channel_id: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

/// Enqueue a channel for ingest. Idempotent: a live queue row for the
/// same channel returns `success: false` with the existing state.
pub async fn process(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ProcessChannelRequest>,
) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }
    if req.channel_id.trim().is_empty() {
        return ApiError::bad_request("channelId is required").into_response();
    }

    let user = match ratelimit::enforce(&state, &headers, &peer, RateAction::ChannelProcess) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let priority = req.priority.unwrap_or_default();
    let outcome = match state.queue.enqueue_channel(
        req.channel_id.trim(),
        user.id.as_deref(),
        user.email.as_deref(),
        priority,
    ) {
        Ok(outcome) => outcome,
        Err(e) => {
            return ApiError::from_kind(
                &vidsift_core::VidsiftError::Store(e.to_string()),
                state.config.is_production(),
            )
            .into_response();
        }
    };

    if outcome.success && priority == Priority::High {
        state.dispatcher.dispatch_channel_now(&outcome.queue_id);
    }

    Json(json!({
        "success": outcome.success,
        "queueId": outcome.queue_id,
        "status": outcome.status,
        "message": outcome.message,
        "position": outcome.position,
    }))
    .into_response()
}

/// Current queue row (and catalog status) for a channel.
pub async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }

    let channel = state.catalog.channel(&id).ok().flatten();
    let item = state.queue.latest_for_channel(&id).ok().flatten();
    if channel.is_none() && item.is_none() {
        return ApiError::not_found(format!("channel {id}")).into_response();
    }

    Json(json!({
        "channel": channel,
        "queueItem": item,
    }))
    .into_response()
}
