//! Generation job processor
//!
//! Drives one job from `pending` to a terminal state:
//! 1. Load the job and move it to `processing` (progress 10)
//! 2. Resolve the provider; failing here fails the whole job
//! 3. For each item: render, generate, parse, append
//! 4. Mark the job completed (progress 100)
//!
//! Items run strictly in order. An item that fails to render or generate
//! is recorded as `{error, index}` and the loop moves on. Every write goes
//! through [`GenerationStore::save_active`], so a job cancelled mid-run is
//! never overwritten: the first refused write stops the loop.

use super::parser::parse_output;
use crate::db::models::{GenerationJob, ItemOutcome, JobStatus};
use crate::db::GenerationStore;
use crate::error::{ForgeError, Result};
use chrono::Utc;
use llm::{GenerationOutput, GenerationRequest, LlmProvider, ProviderRegistry, ResponseFormat};
use serde_json::{Map, Value};
use std::sync::Arc;
use templates::{RenderedPrompt, Renderer};
use tracing::{debug, error, info, warn};

/// A successfully generated item.
struct GeneratedItem {
    prompt: RenderedPrompt,
    output: GenerationOutput,
}

/// Why an item produced no output. The prompt is kept when rendering
/// succeeded so item 0 can still record it.
struct ItemError {
    prompt: Option<RenderedPrompt>,
    error: ForgeError,
}

pub struct JobProcessor {
    jobs: Arc<dyn GenerationStore>,
    registry: Arc<ProviderRegistry>,
    renderer: Arc<Renderer>,
}

impl JobProcessor {
    pub fn new(
        jobs: Arc<dyn GenerationStore>,
        registry: Arc<ProviderRegistry>,
        renderer: Arc<Renderer>,
    ) -> Self {
        Self {
            jobs,
            registry,
            renderer,
        }
    }

    /// Process a job to completion.
    ///
    /// Returns the status the job was left in. Jobs that are not `pending`
    /// are left untouched.
    pub async fn process(&self, job_id: &str) -> Result<JobStatus> {
        let mut job = self
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| ForgeError::not_found(format!("Generation {} not found", job_id)))?;

        if job.status != JobStatus::Pending {
            debug!(job_id = %job_id, status = %job.status, "Skipping job that is not pending");
            return Ok(job.status);
        }

        job.start(Utc::now())
            .map_err(|e| ForgeError::invalid_state(e.to_string()))?;
        if !self.jobs.save_active(&job).await? {
            return self.stored_status(job_id).await;
        }
        info!(job_id = %job_id, provider = %job.provider, model = %job.model, count = job.count, "Generation started");

        match self.run_items(&mut job).await {
            Ok(true) => {
                job.complete(Utc::now())
                    .map_err(|e| ForgeError::invalid_state(e.to_string()))?;
                if self.jobs.save_active(&job).await? {
                    info!(
                        job_id = %job_id,
                        total_tokens = job.usage.total_tokens,
                        cost = job.usage.cost,
                        "Generation completed"
                    );
                    Ok(JobStatus::Completed)
                } else {
                    self.stored_status(job_id).await
                }
            }
            Ok(false) => {
                info!(job_id = %job_id, "Generation stopped: job is no longer active");
                self.stored_status(job_id).await
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Generation failed");
                job.fail(e.to_string(), Utc::now())
                    .map_err(|e| ForgeError::invalid_state(e.to_string()))?;
                if self.jobs.save_active(&job).await? {
                    Ok(JobStatus::Failed)
                } else {
                    self.stored_status(job_id).await
                }
            }
        }
    }

    async fn stored_status(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .get_job(job_id)
            .await?
            .map(|job| job.status)
            .ok_or_else(|| ForgeError::not_found(format!("Generation {} not found", job_id)))
    }

    /// Run the item loop. `Ok(false)` means a write was refused because the
    /// job left the active states (cancelled); `Err` is a job-level failure.
    async fn run_items(&self, job: &mut GenerationJob) -> Result<bool> {
        let provider = self.registry.get(&job.provider)?;

        for i in 0..job.count {
            job.progress = GenerationJob::item_progress(i, job.count);
            if !self.jobs.save_active(job).await? {
                return Ok(false);
            }

            let index = i + 1;
            let outcome = match self.generate_item(provider.as_ref(), job, index).await {
                Ok(item) => {
                    if i == 0 {
                        job.prompt_rendered = Some(item.prompt.diagnostic());
                    }
                    job.usage.record(&item.output);
                    ItemOutcome::Generated(parse_output(
                        &item.output.content,
                        job.template.has_output_schema(),
                    ))
                }
                Err(ItemError { prompt, error }) => {
                    if let (0, Some(prompt)) = (i, prompt) {
                        job.prompt_rendered = Some(prompt.diagnostic());
                    }
                    warn!(job_id = %job.job_id, index, error = %error, "Item generation failed");
                    ItemOutcome::failed(index, error.to_string())
                }
            };

            job.push_result(outcome)
                .map_err(|e| ForgeError::invalid_state(e.to_string()))?;
            if !self.jobs.save_active(job).await? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    async fn generate_item(
        &self,
        provider: &dyn LlmProvider,
        job: &GenerationJob,
        index: u32,
    ) -> std::result::Result<GeneratedItem, ItemError> {
        let variables = item_variables(&job.variables, index);
        let template = &job.template;

        let prompt = self
            .renderer
            .render_pair(
                &template.system_prompt,
                &template.user_prompt,
                &template.variables,
                &variables,
            )
            .map_err(|e| ItemError {
                prompt: None,
                error: e.into(),
            })?;

        let settings = &template.provider_settings;
        let format = if template.has_output_schema() {
            ResponseFormat::Json
        } else {
            ResponseFormat::Text
        };
        let request = GenerationRequest::new(
            job.model.clone(),
            prompt.system_prompt.clone(),
            prompt.user_prompt.clone(),
        )
        .with_temperature(settings.temperature.unwrap_or(GenerationRequest::DEFAULT_TEMPERATURE))
        .with_max_tokens(settings.max_tokens.unwrap_or(GenerationRequest::DEFAULT_MAX_TOKENS))
        .with_response_format(format);

        debug!(job_id = %job.job_id, index, provider = provider.id(), "Requesting generation");
        match provider.generate(request).await {
            Ok(output) => Ok(GeneratedItem { prompt, output }),
            Err(e) => Err(ItemError {
                prompt: Some(prompt),
                error: e.into(),
            }),
        }
    }
}

/// Job variables plus the injected 1-based `index` and ISO-8601 `date`.
pub fn item_variables(variables: &Map<String, Value>, index: u32) -> Map<String, Value> {
    let mut vars = variables.clone();
    vars.insert("index".to_string(), Value::from(index));
    vars.insert("date".to_string(), Value::String(Utc::now().to_rfc3339()));
    vars
}
