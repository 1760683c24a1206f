//! API data transfer objects (DTOs) and response models

pub mod generation;
pub mod provider;
pub mod template;

pub use generation::{
    BatchRequest, BatchResponse, CancelResponse, ExportQuery, GenerationResponse, HistoryQuery,
};
pub use provider::{ModelListQuery, ModelLookupQuery, ProviderTestRequest, ProviderTestResponse};
pub use template::{PreviewRequest, TemplateListQuery, TemplateWithWarnings};

/// System health response
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: String,

    /// Database connection status
    pub database: String,

    /// API version
    pub version: String,

    /// Current timestamp
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(status: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            database: database.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
