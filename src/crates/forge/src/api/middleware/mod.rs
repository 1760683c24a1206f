//! API middleware layer
//!
//! CORS, request logging, bearer-token extraction and query validation.

pub mod auth;
pub mod cors;
pub mod logging;
pub mod validation;

pub use auth::CurrentUser;
pub use cors::cors_layer;
pub use logging::logging_layer;
pub use validation::{validate_not_empty, validate_pagination};
