//! API request handlers
//!
//! Provides handler functions for all API endpoints organized by resource.

pub mod generation;
pub mod health;
pub mod providers;
pub mod templates;

pub use generation::{
    cancel_generation, export_generation, get_generation, get_generation_result, list_history,
    start_batch, start_generation,
};
pub use health::{health, health_detailed};
pub use providers::{get_model, list_models, list_providers, test_provider};
pub use templates::{
    create_template, delete_template, get_template, list_templates, preview_template,
    update_template, validate_template,
};
