//! Generation endpoint handlers

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};

use crate::api::{
    error::{ApiError, ApiResult},
    middleware::{validate_not_empty, CurrentUser},
    models::{BatchRequest, BatchResponse, CancelResponse, ExportQuery, GenerationResponse, HistoryQuery},
    response,
    routes::AppState,
};
use crate::export::encode;
use crate::services::GenerateRequest;

/// Validate the request, persist a pending job and schedule it
///
/// POST /api/v1/generate
pub async fn start_generation(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<GenerateRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_not_empty(&req.template_id, "template_id")?;
    validate_not_empty(&req.provider, "provider")?;
    validate_not_empty(&req.model, "model")?;

    let submitted = app_state.generations.create(&user.user_id, req).await?;
    Ok(response::accepted(GenerationResponse::from(&submitted.job)))
}

/// POST /api/v1/generate/batch
pub async fn start_batch(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<BatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let jobs = app_state
        .generations
        .batch(&user.user_id, req.generations)
        .await?;
    Ok(response::accepted(BatchResponse { jobs }))
}

/// GET /api/v1/generate/:job_id
pub async fn get_generation(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = app_state.generations.status(&user.user_id, &job_id).await?;
    Ok(response::ok(job))
}

/// GET /api/v1/generate/:job_id/result
pub async fn get_generation_result(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = app_state.generations.result(&user.user_id, &job_id).await?;
    Ok(response::ok(job))
}

/// DELETE /api/v1/generate/:job_id
pub async fn cancel_generation(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    app_state.generations.cancel(&user.user_id, &job_id).await?;
    Ok(response::ok(CancelResponse {
        message: "Generation cancelled".to_string(),
    }))
}

/// Download a completed job's results
///
/// GET /api/v1/generate/:job_id/export?format=
pub async fn export_generation(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(job_id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<impl IntoResponse> {
    let format = query.format()?;
    let payload = app_state
        .generations
        .export(&user.user_id, &job_id, format)
        .await?;
    let body = encode(format, &payload)
        .map_err(|e| ApiError::InternalError(format!("Export failed: {}", e)))?;

    tracing::info!(job_id = %job_id, format = %format, bytes = body.len(), "Exported generation");
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", format.filename(&job_id)),
            ),
        ],
        body,
    ))
}

/// The caller's jobs, newest first
///
/// GET /api/v1/history
pub async fn list_history(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = query.into_filter(&user.user_id)?;
    let page = app_state.generations.history(&user.user_id, filter).await?;
    Ok(response::ok(page))
}
