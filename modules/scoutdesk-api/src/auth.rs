use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::AppState;

/// Proof that the request carried the configured bearer token. Extract this
/// in handlers that require auth; a missing or wrong token is a 401.
pub struct ApiToken;

impl FromRequestParts<Arc<AppState>> for ApiToken {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        match presented {
            Some(token) if token_matches(token, &state.api_token) => Ok(ApiToken),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response()),
        }
    }
}

/// The token part of an `Authorization: Bearer <token>` header.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// An empty configured token never matches.
fn token_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && constant_time_eq(presented.as_bytes(), expected.as_bytes())
}

/// Constant-time comparison to prevent timing attacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
