//! Provider endpoint handlers
//!
//! Listing endpoints are public; the connection test requires a token.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::{
    error::ApiResult,
    middleware::CurrentUser,
    models::{ModelListQuery, ModelLookupQuery, ProviderTestRequest, ProviderTestResponse},
    response,
    routes::AppState,
};

/// GET /api/v1/providers
pub async fn list_providers(State(app_state): State<AppState>) -> impl axum::response::IntoResponse {
    response::ok(app_state.providers.list_providers().await)
}

/// GET /api/v1/providers/models
pub async fn list_models(
    State(app_state): State<AppState>,
    Query(query): Query<ModelListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let models = app_state.providers.list_models(&query.into()).await?;
    Ok(response::ok(models))
}

/// Model ids contain slashes (`openai/gpt-4o`), so the route captures the
/// rest of the path.
///
/// GET /api/v1/providers/models/*model_id
pub async fn get_model(
    State(app_state): State<AppState>,
    Path(model_id): Path<String>,
    Query(query): Query<ModelLookupQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let model_id = model_id.trim_start_matches('/');
    let model = app_state
        .providers
        .get_model(query.provider.as_deref(), model_id)
        .await?;
    Ok(response::ok(model))
}

/// POST /api/v1/providers/test
pub async fn test_provider(
    State(app_state): State<AppState>,
    _user: CurrentUser,
    Json(req): Json<ProviderTestRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let summary = app_state.providers.test(&req.provider).await?;
    Ok(response::ok(ProviderTestResponse::from(summary)))
}
