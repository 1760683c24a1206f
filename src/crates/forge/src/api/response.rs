//! API response helpers
//!
//! Bodies are sent as-is, without an envelope.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

/// 200 OK
pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

/// 201 Created
pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(data))
}

/// 202 Accepted, for work that continues in the background
pub fn accepted<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(data))
}

/// 204 No Content
pub fn no_content() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
