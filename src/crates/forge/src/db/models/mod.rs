//! Database models
//!
//! Domain records ([`GenerationJob`] here, [`templates::Template`] from the
//! templates crate) plus the row shapes the SQLite backend reads and writes.

pub mod generation;
pub mod rows;

pub use generation::{
    GenerationJob, ItemFailure, ItemOutcome, JobMetadata, JobStatus, TemplateSnapshot,
    TransitionError, UsageTotals, CANCELLED_MESSAGE, MAX_COUNT, MIN_COUNT,
};
pub use rows::{timestamp, GenerationRow, TemplateRow};
