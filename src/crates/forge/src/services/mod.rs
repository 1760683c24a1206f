//! Application services
//!
//! The HTTP layer calls into these; they own validation, access checks and
//! job scheduling.

pub mod generation;
pub mod provider;
pub mod template;

pub use generation::{BatchEntry, GenerateRequest, GenerationService, Submitted, MAX_BATCH};
pub use provider::{ModelQuery, ProviderService, ProviderSummary};
pub use template::{PreviewSource, TemplatePatch, TemplateService};
