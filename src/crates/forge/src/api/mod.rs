//! REST API layer
//!
//! - Template CRUD, validation and preview
//! - Provider and model catalog
//! - Generation jobs: submit, status, result, cancel, export, history
//! - Health checks
//!
//! Every endpoint except health and the provider catalog requires
//! `Authorization: Bearer <token>`.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use middleware::{cors_layer, CurrentUser};
pub use routes::{create_router, AppState};
