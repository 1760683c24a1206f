//! API route definitions

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::{handlers, middleware};
use crate::auth::JwtManager;
use crate::db::DatabaseConnection;
use crate::services::{GenerationService, ProviderService, TemplateService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub templates: Arc<TemplateService>,
    pub generations: Arc<GenerationService>,
    pub providers: Arc<ProviderService>,
    pub jwt: Arc<JwtManager>,
    /// Present for the SQLite backend
    pub db: Option<DatabaseConnection>,
}

/// Build the complete API router
pub fn create_router(app_state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Health check endpoints
        .route("/health", get(handlers::health))
        .route("/api/v1/system/health", get(handlers::health_detailed))
        // Template endpoints
        .route(
            "/api/v1/templates",
            post(handlers::create_template).get(handlers::list_templates),
        )
        .route("/api/v1/templates/validate", post(handlers::validate_template))
        .route("/api/v1/templates/preview", post(handlers::preview_template))
        .route(
            "/api/v1/templates/:id",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        // Provider endpoints
        .route("/api/v1/providers", get(handlers::list_providers))
        .route("/api/v1/providers/models", get(handlers::list_models))
        .route("/api/v1/providers/models/*model_id", get(handlers::get_model))
        .route("/api/v1/providers/test", post(handlers::test_provider))
        // Generation endpoints
        .route("/api/v1/generate", post(handlers::start_generation))
        .route("/api/v1/generate/batch", post(handlers::start_batch))
        .route(
            "/api/v1/generate/:job_id",
            get(handlers::get_generation).delete(handlers::cancel_generation),
        )
        .route(
            "/api/v1/generate/:job_id/result",
            get(handlers::get_generation_result),
        )
        .route(
            "/api/v1/generate/:job_id/export",
            get(handlers::export_generation),
        )
        .route("/api/v1/history", get(handlers::list_history))
        .layer(middleware::logging_layer())
        .layer(middleware::cors_layer(cors_origins))
        .with_state(app_state)
}
