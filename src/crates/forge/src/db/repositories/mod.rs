//! Database repositories
//!
//! Query layer over the SQLite pool, one repository per table.

pub mod generation_repo;
pub mod template_repo;

pub use generation_repo::GenerationRepository;
pub use template_repo::TemplateRepository;
