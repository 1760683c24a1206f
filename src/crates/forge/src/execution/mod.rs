//! Asynchronous job execution
//!
//! [`JobProcessor`] runs a job's item loop; [`WorkerPool`] schedules
//! processors behind the [`JobDispatcher`] interface.

pub mod dispatcher;
pub mod parser;
pub mod processor;

pub use dispatcher::{JobDispatcher, JobHandle, WorkerConfig, WorkerPool};
pub use parser::{extract_json, parse_output};
pub use processor::JobProcessor;
