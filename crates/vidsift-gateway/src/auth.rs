use std::net::SocketAddr;

use axum::http::HeaderMap;

use vidsift_core::types::RequestUser;

use crate::app::AppState;

/// Validate the shared-secret header. An empty configured key disables
/// inbound auth (local development).
pub fn check_api_key(state: &AppState, headers: &HeaderMap) -> bool {
    let expected = state.config.auth.api_key.as_str();
    if expected.is_empty() {
        return true;
    }
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|got| got == expected)
        .unwrap_or(false)
}

/// Build the caller identity from the identity headers the edge attaches.
pub fn request_user(headers: &HeaderMap) -> RequestUser {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    RequestUser {
        id: header("x-user-id"),
        email: header("x-user-email"),
        premium: header("x-user-premium").as_deref() == Some("true"),
    }
}

/// Resolve the client IP for anonymous rate limiting, in documented
/// order: Cloudflare, first X-Forwarded-For hop, X-Real-IP, socket peer.
pub fn client_ip(headers: &HeaderMap, peer: &SocketAddr) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let Some(ip) = header("cf-connecting-ip") {
        return ip;
    }
    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = header("x-real-ip") {
        return ip;
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "10.0.0.9:55000".parse().unwrap()
    }

    #[test]
    fn cloudflare_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("1.1.1.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("2.2.2.2"));
        assert_eq!(client_ip(&headers, &peer()), "1.1.1.1");
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("2.2.2.2, 3.3.3.3"),
        );
        assert_eq!(client_ip(&headers, &peer()), "2.2.2.2");
    }

    #[test]
    fn falls_back_to_socket_peer() {
        assert_eq!(client_ip(&HeaderMap::new(), &peer()), "10.0.0.9");
    }

    #[test]
    fn anonymous_user_without_headers() {
        let user = request_user(&HeaderMap::new());
        assert!(user.id.is_none());
        assert!(!user.premium);
    }
}
