//! Error types for rendering and template validation.

use thiserror::Error;

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// A prompt failed to render.
///
/// Raised for syntax errors and for any variable the prompt references that
/// was neither supplied nor filled from a definition default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<minijinja::Error> for RenderError {
    fn from(err: minijinja::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// Template-level failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Structure validation failed; every problem found is listed.
    #[error("Invalid template: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}
