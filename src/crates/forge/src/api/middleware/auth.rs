//! Bearer token extractor

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::api::error::ApiError;
use crate::api::routes::AppState;

/// Authenticated caller, taken from `Authorization: Bearer <token>`.
///
/// ```ignore
/// async fn handler(user: CurrentUser) -> ApiResult<impl IntoResponse> {
///     tracing::info!(user_id = %user.user_id, "handling request");
///     Ok(response::no_content())
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: String,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        })?;

        let claims = state
            .jwt
            .verify(token)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".into()))?;

        Ok(CurrentUser { user_id: claims.sub })
    }
}
