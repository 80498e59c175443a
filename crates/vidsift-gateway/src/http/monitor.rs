//! Read-only operational surface — GET /api/monitor/stats,
//! GET /api/cron/status, GET /api/errors/stats.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::app::AppState;
use crate::auth;
use crate::error::ApiError;

pub async fn stats(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }

    let catalog = state.catalog.counts().unwrap_or_default();
    let queue = state.queue.counts().unwrap_or_default();
    Json(json!({
        "catalog": catalog,
        "queue": queue,
        "activeChatStreams": state.chat.active_stream_count(),
    }))
    .into_response()
}

pub async fn cron_status(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }
    Json(json!({ "lastRuns": state.dispatcher.tick_status() })).into_response()
}

pub async fn error_stats(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if !auth::check_api_key(&state, &headers) {
        return ApiError::unauthorized().into_response();
    }

    match state.errors.stats() {
        Ok(stats) => {
            let by_type: serde_json::Map<String, serde_json::Value> = stats
                .by_type
                .into_iter()
                .map(|(error_type, count)| (error_type, json!(count)))
                .collect();
            Json(json!({ "total": stats.total, "byType": by_type })).into_response()
        }
        Err(e) => ApiError::from_kind(
            &vidsift_core::VidsiftError::Store(e.to_string()),
            state.config.is_production(),
        )
        .into_response(),
    }
}
