//! Queue introspection — GET /api/queue/status and
//! GET /api/queue/position/:qid. (Enqueueing lives on the channel/video
//! process handlers, which /api/queue/channel and /api/queue/video alias.)

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use vidsift_queue::QueueError;

use crate::app::AppState;
use crate::auth;
use crate::error::ApiError;

/// Status counts plus the head of the pending queue.
pub async fn status(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }

    let counts = match state.queue.counts() {
        Ok(counts) => counts,
        Err(e) => {
            return ApiError::from_kind(
                &vidsift_core::VidsiftError::Store(e.to_string()),
                state.config.is_production(),
            )
            .into_response();
        }
    };
    let pending = state.queue.fetch_pending(10).unwrap_or_default();

    Json(json!({
        "counts": counts,
        "pending": pending,
    }))
    .into_response()
}

/// 1-based position of a pending queue item; null once it leaves pending.
pub async fn position(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(qid): Path<String>,
) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }

    match state.queue.position(&qid) {
        Ok(position) => Json(json!({ "queueId": qid, "position": position })).into_response(),
        Err(QueueError::NotFound(_)) => {
            ApiError::not_found(format!("queue item {qid}")).into_response()
        }
        Err(e) => ApiError::from_kind(
            &vidsift_core::VidsiftError::Store(e.to_string()),
            state.config.is_production(),
        )
        .into_response(),
    }
}
