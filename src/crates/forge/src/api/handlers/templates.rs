//! Template endpoint handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use templates::TemplateDraft;

use crate::api::{
    error::ApiResult,
    middleware::{validate_not_empty, CurrentUser},
    models::{PreviewRequest, TemplateListQuery, TemplateWithWarnings},
    response,
    routes::AppState,
};
use crate::services::TemplatePatch;

/// Create a template owned by the caller
///
/// POST /api/v1/templates
pub async fn create_template(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Json(draft): Json<TemplateDraft>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validate_not_empty(&draft.name, "name")?;

    let (template, warnings) = app_state.templates.create(&user.user_id, draft).await?;
    Ok(response::created(TemplateWithWarnings { template, warnings }))
}

/// List the caller's templates and public ones
///
/// GET /api/v1/templates
pub async fn list_templates(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<TemplateListQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let filter = query.into_filter(&user.user_id)?;
    let page = app_state.templates.list(&filter).await?;
    Ok(response::ok(page))
}

/// GET /api/v1/templates/:id
pub async fn get_template(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let template = app_state.templates.get(&user.user_id, &id).await?;
    Ok(response::ok(template))
}

/// Apply a partial update (owner only)
///
/// PUT /api/v1/templates/:id
pub async fn update_template(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<TemplatePatch>,
) -> ApiResult<impl axum::response::IntoResponse> {
    if let Some(name) = &patch.name {
        validate_not_empty(name, "name")?;
    }

    let (template, warnings) = app_state.templates.update(&user.user_id, &id, patch).await?;
    Ok(response::ok(TemplateWithWarnings { template, warnings }))
}

/// DELETE /api/v1/templates/:id
pub async fn delete_template(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    app_state.templates.delete(&user.user_id, &id).await?;
    Ok(response::no_content())
}

/// Dry-run structural validation
///
/// POST /api/v1/templates/validate
pub async fn validate_template(
    State(app_state): State<AppState>,
    _user: CurrentUser,
    Json(draft): Json<TemplateDraft>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(app_state.templates.validate(&draft)))
}

/// Render a stored template or a draft with sample variables
///
/// POST /api/v1/templates/preview
pub async fn preview_template(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<PreviewRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let (source, variables) = req.into_parts()?;
    let rendered = app_state
        .templates
        .preview(&user.user_id, source, &variables)
        .await?;
    Ok(response::ok(rendered))
}
