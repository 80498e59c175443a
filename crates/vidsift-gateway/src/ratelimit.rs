use std::net::SocketAddr;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use vidsift_core::types::{RateAction, RequestUser};

use crate::app::AppState;
use crate::auth;

/// Check and record one rate-limited action. Returns the caller identity
/// on success, or a ready-to-send 429 response.
pub fn enforce(
    state: &AppState,
    headers: &HeaderMap,
    peer: &SocketAddr,
    action: RateAction,
) -> Result<RequestUser, Response> {
    let user = auth::request_user(headers);
    let identifier = user.rate_identifier(&auth::client_ip(headers, peer));

    let decision = state.limits.check(&identifier, action, user.class());
    if !decision.allowed {
        let limit = decision.limit.unwrap_or(0);
        let reset_at = decision.reset_at.to_rfc3339();
        let body = json!({
            "error": "rate_limit_exceeded",
            "message": format!("Too many {action} requests; try again later"),
            "limit": limit,
            "window": decision.window,
            "resetAt": reset_at,
        });
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let response_headers = response.headers_mut();
        if let Ok(v) = limit.to_string().parse() {
            response_headers.insert("X-RateLimit-Limit", v);
        }
        if let Ok(v) = decision.remaining.to_string().parse() {
            response_headers.insert("X-RateLimit-Remaining", v);
        }
        if let Ok(v) = reset_at.parse() {
            response_headers.insert("X-RateLimit-Reset", v);
        }
        return Err(response);
    }

    if let Err(e) = state.limits.record(&identifier, action) {
        // Recording is best-effort; the fail-open policy applies here too.
        warn!(identifier, error = %e, "rate event record failed");
    }
    Ok(user)
}
