use axum::http::{header, header::HeaderMap};
use uuid::Uuid;

/// Header carrying the acting account for admin routes.
pub(super) const ACTOR_HEADER: &str = "x-account-id";

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// True when a service token is configured and the request presents it.
pub(super) fn has_service_token(headers: &HeaderMap, expected_token: &str) -> bool {
    !expected_token.is_empty() && extract_bearer_token(headers) == Some(expected_token)
}

pub(super) fn extract_actor(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}
