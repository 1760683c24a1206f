//! Service-level error taxonomy.

use crate::db::DatabaseError;
use llm::LlmError;
use templates::{RenderError, TemplateError};
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Errors surfaced by the template and generation services.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Template or job is absent, or not visible to the caller
    #[error("{0}")]
    NotFound(String),

    /// Ownership or visibility violation
    #[error("{0}")]
    AccessDenied(String),

    /// Variable or template-structure validation failed
    #[error("Validation failed: {}", .0.join(", "))]
    ValidationFailed(Vec<String>),

    /// Illegal job transition or request against a job in the wrong state
    #[error("{0}")]
    InvalidState(String),

    /// Upstream LLM call failed
    #[error(transparent)]
    Provider(#[from] LlmError),

    /// A prompt could not be rendered
    #[error("Template rendering error: {0}")]
    Render(#[from] RenderError),

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] DatabaseError),

    /// The job could not be handed to a worker
    #[error("Failed to schedule job: {0}")]
    Dispatch(String),
}

impl ForgeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ForgeError::NotFound(what.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ForgeError::InvalidState(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ForgeError::ValidationFailed(vec![message.into()])
    }
}

impl From<TemplateError> for ForgeError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Invalid(errors) => ForgeError::ValidationFailed(errors),
            TemplateError::Render(err) => ForgeError::Render(err),
        }
    }
}
