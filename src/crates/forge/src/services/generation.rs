//! Generation jobs: creation, status, cancellation, history, batch, export
//!
//! Creation validates synchronously and creates no job on failure.
//! Processing happens later, on whatever [`JobDispatcher`] the service was
//! built with. Every lookup is scoped to the caller: another user's job
//! reads as not found.

use crate::db::models::{GenerationJob, JobStatus, MAX_COUNT, MIN_COUNT};
use crate::db::{GenerationStore, JobFilter, Page, TemplateStore};
use crate::error::{ForgeError, Result};
use crate::execution::{JobDispatcher, JobHandle};
use crate::export::{export, ExportFormat, ExportPayload};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use templates::{ValidationMode, Validator};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Largest accepted batch.
pub const MAX_BATCH: usize = 10;

const ID_ATTEMPTS: usize = 5;

fn default_count() -> u32 {
    1
}

/// A request to generate `count` items from a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub template_id: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default = "default_count")]
    pub count: u32,
}

/// Outcome of one batch entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Started {
        job_id: String,
        status: JobStatus,
        template_id: String,
    },
    /// `template_id` is whatever the entry carried, if anything.
    Rejected {
        error: String,
        template_id: Option<String>,
    },
}

/// A created job and the handle of its scheduled run.
#[derive(Debug)]
pub struct Submitted {
    pub job: GenerationJob,
    pub handle: JobHandle,
}

/// `gen_` plus eight lowercase hex characters.
pub fn new_job_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("gen_{}", &hex[..8])
}

pub struct GenerationService {
    templates: Arc<dyn TemplateStore>,
    jobs: Arc<dyn GenerationStore>,
    validator: Arc<Validator>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl GenerationService {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        jobs: Arc<dyn GenerationStore>,
        validator: Arc<Validator>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            templates,
            jobs,
            validator,
            dispatcher,
        }
    }

    /// Validate, persist a `pending` job and schedule it.
    pub async fn create(&self, user_id: &str, request: GenerateRequest) -> Result<Submitted> {
        if !(MIN_COUNT..=MAX_COUNT).contains(&request.count) {
            return Err(ForgeError::validation(format!(
                "count must be between {} and {}",
                MIN_COUNT, MAX_COUNT
            )));
        }

        let template = self
            .templates
            .get_template(&request.template_id)
            .await?
            .ok_or_else(|| ForgeError::not_found(format!("Template {} not found", request.template_id)))?;
        if !template.is_visible_to(user_id) {
            return Err(ForgeError::AccessDenied(
                "Access denied to private template".to_string(),
            ));
        }

        let warnings = if template.validation_mode == ValidationMode::None {
            Vec::new()
        } else {
            let report = self.validator.validate_generation(&template, &request.variables);
            report.into_result()?
        };

        let mut attempt = 0;
        let job = loop {
            attempt += 1;
            let job = GenerationJob::new(
                new_job_id(),
                user_id,
                &template,
                request.provider.clone(),
                request.model.clone(),
                request.variables.clone(),
                request.count,
                warnings.clone(),
                Utc::now(),
            );
            match self.jobs.insert_job(&job).await {
                Ok(()) => break job,
                Err(e) if e.is_constraint_violation() && attempt < ID_ATTEMPTS => {
                    warn!(job_id = %job.job_id, "Job id collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        };

        match self.dispatcher.submit(&job.job_id) {
            Ok(handle) => {
                info!(job_id = %job.job_id, template_id = %job.template_id, count = job.count, "Generation queued");
                Ok(Submitted { job, handle })
            }
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "Failed to schedule generation");
                let mut failed = job;
                if failed.fail(e.to_string(), Utc::now()).is_ok() {
                    self.jobs.save_active(&failed).await?;
                }
                Err(e)
            }
        }
    }

    /// The caller's job, or not found.
    pub async fn status(&self, user_id: &str, job_id: &str) -> Result<GenerationJob> {
        match self.jobs.get_job(job_id).await? {
            Some(job) if job.user_id == user_id => Ok(job),
            _ => Err(ForgeError::not_found(format!("Generation {} not found", job_id))),
        }
    }

    /// The caller's job, only once completed.
    pub async fn result(&self, user_id: &str, job_id: &str) -> Result<GenerationJob> {
        let job = self.status(user_id, job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(ForgeError::invalid_state("Generation not completed"));
        }
        Ok(job)
    }

    /// Cancel a pending or processing job.
    ///
    /// Only the record changes: a provider call already in flight runs to
    /// its end, and the processor stops at its next write. Results the
    /// processor stored before the cancel are kept.
    pub async fn cancel(&self, user_id: &str, job_id: &str) -> Result<GenerationJob> {
        let job = self.status(user_id, job_id).await?;
        if job.is_terminal() {
            return Err(cannot_cancel(job.status));
        }
        match self.jobs.cancel_active(job_id, Utc::now()).await? {
            Some(cancelled) => {
                info!(job_id = %job_id, results = cancelled.results.len(), "Generation cancelled");
                Ok(cancelled)
            }
            None => {
                // The processor reached a terminal state first.
                let current = self.status(user_id, job_id).await?;
                Err(cannot_cancel(current.status))
            }
        }
    }

    /// The caller's jobs, newest first. `filter.user_id` is overwritten.
    pub async fn history(&self, user_id: &str, mut filter: JobFilter) -> Result<Page<GenerationJob>> {
        filter.user_id = user_id.to_string();
        Ok(self.jobs.list_jobs(&filter).await?)
    }

    /// Attempt each entry independently. An entry that does not decode as
    /// a [`GenerateRequest`] is rejected on its own; the rest still run.
    pub async fn batch(&self, user_id: &str, entries: Vec<Value>) -> Result<Vec<BatchEntry>> {
        if entries.is_empty() {
            return Err(ForgeError::validation("batch must contain at least one request"));
        }
        if entries.len() > MAX_BATCH {
            return Err(ForgeError::validation(format!(
                "batch may contain at most {} requests",
                MAX_BATCH
            )));
        }

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let template_id = entry
                .get("template_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            let request = match serde_json::from_value::<GenerateRequest>(entry) {
                Ok(request) => request,
                Err(e) => {
                    warn!(template_id = ?template_id, error = %e, "Rejected malformed batch entry");
                    results.push(BatchEntry::Rejected {
                        error: format!("Invalid generation request: {}", e),
                        template_id,
                    });
                    continue;
                }
            };
            let entry = match self.create(user_id, request).await {
                Ok(submitted) => BatchEntry::Started {
                    job_id: submitted.job.job_id,
                    status: submitted.job.status,
                    template_id: submitted.job.template_id,
                },
                Err(e) => BatchEntry::Rejected {
                    error: e.to_string(),
                    template_id,
                },
            };
            results.push(entry);
        }
        Ok(results)
    }

    /// Export a completed job's results.
    pub async fn export(&self, user_id: &str, job_id: &str, format: ExportFormat) -> Result<ExportPayload> {
        let job = self.result(user_id, job_id).await?;
        Ok(export(&job.result_maps(), format))
    }
}

fn cannot_cancel(status: JobStatus) -> ForgeError {
    ForgeError::invalid_state(format!("Cannot cancel {} generation", status))
}
