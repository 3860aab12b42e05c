use axum::http::{header, HeaderMap};

use crate::api::error::ApiError;

/// Require `Authorization: Bearer <token>`.
pub(super) fn require_bearer(headers: &HeaderMap, token: &str) -> Result<(), ApiError> {
    let expected = format!("Bearer {}", token);
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if !token.is_empty() && value == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}
