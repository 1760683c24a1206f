//! Generation job model
//!
//! A [`GenerationJob`] owns the life cycle of one generation request:
//! `pending -> processing -> {completed | failed | cancelled}`. Terminal
//! states are final; the transition methods refuse to leave them.

use chrono::{DateTime, Utc};
use llm::GenerationOutput;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use templates::{ProviderSettings, Template, VariableSchema};
use thiserror::Error;

/// Smallest accepted item count.
pub const MIN_COUNT: u32 = 1;
/// Largest accepted item count.
pub const MAX_COUNT: u32 = 100;

/// `error_message` of a job cancelled by its owner.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// `pending` and `processing` are the only non-terminal states.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// Rejected state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid state transition from {from} to {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// An item that raised instead of producing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ItemFailure {
    pub error: String,
    /// 1-based item position
    pub index: u32,
}

/// One entry of a job's result list.
///
/// Serialized without a tag: failures appear as `{error, index}` and
/// generated items as whatever object the model produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemOutcome {
    Failed(ItemFailure),
    Generated(Map<String, Value>),
}

impl ItemOutcome {
    pub fn failed(index: u32, error: impl Into<String>) -> Self {
        ItemOutcome::Failed(ItemFailure {
            error: error.into(),
            index,
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed(_))
    }

    /// Mapping view used by the exporter.
    pub fn to_map(&self) -> Map<String, Value> {
        match self {
            ItemOutcome::Generated(map) => map.clone(),
            ItemOutcome::Failed(failure) => {
                let mut map = Map::new();
                map.insert("error".to_string(), Value::String(failure.error.clone()));
                map.insert("index".to_string(), Value::from(failure.index));
                map
            }
        }
    }
}

/// Token and cost totals across a job's items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

impl UsageTotals {
    /// Add whatever usage the provider reported. Missing fields add nothing.
    pub fn record(&mut self, output: &GenerationOutput) {
        if let Some(usage) = output.usage {
            self.total_tokens += usage.total_tokens;
            self.prompt_tokens += usage.prompt_tokens;
            self.completion_tokens += usage.completion_tokens;
        }
        if let Some(cost) = output.cost {
            self.cost += cost;
        }
    }
}

/// The parts of a template a job needs, frozen at job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
    pub name: String,
    pub system_prompt: String,
    pub user_prompt: String,
    #[serde(default)]
    pub variables: VariableSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub provider_settings: ProviderSettings,
}

impl TemplateSnapshot {
    pub fn has_output_schema(&self) -> bool {
        templates::has_schema(self.output_schema.as_ref())
    }
}

impl From<&Template> for TemplateSnapshot {
    fn from(template: &Template) -> Self {
        Self {
            name: template.name.clone(),
            system_prompt: template.system_prompt.clone(),
            user_prompt: template.user_prompt.clone(),
            variables: template.variables.clone(),
            output_schema: template.output_schema.clone(),
            provider_settings: template.provider_settings.clone(),
        }
    }
}

/// Free-form job metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub template_name: String,
    #[serde(default)]
    pub validation_warnings: Vec<String>,
}

/// A generation job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    /// `gen_` followed by eight hex characters
    pub job_id: String,
    pub user_id: String,
    pub template_id: String,
    #[serde(skip_serializing)]
    pub template: TemplateSnapshot,
    pub provider: String,
    pub model: String,
    pub variables: Map<String, Value>,
    pub count: u32,
    pub status: JobStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub results: Vec<ItemOutcome>,
    pub prompt_rendered: Option<String>,
    #[serde(flatten)]
    pub usage: UsageTotals,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: JobMetadata,
}

/// Stored form of a job: the public fields plus the template snapshot
/// that the public view leaves out. `template` is only skipped when
/// serializing, so the stored document deserializes directly.
pub(crate) struct StoredJob;

impl StoredJob {
    pub(crate) fn encode(job: &GenerationJob) -> serde_json::Result<String> {
        let mut value = serde_json::to_value(job)?;
        if let Value::Object(map) = &mut value {
            map.insert("template".to_string(), serde_json::to_value(&job.template)?);
        }
        serde_json::to_string(&value)
    }

    pub(crate) fn decode(body: &str) -> serde_json::Result<GenerationJob> {
        serde_json::from_str(body)
    }
}

impl GenerationJob {
    /// A fresh `pending` job with `progress = 0`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: impl Into<String>,
        user_id: impl Into<String>,
        template: &Template,
        provider: impl Into<String>,
        model: impl Into<String>,
        variables: Map<String, Value>,
        count: u32,
        validation_warnings: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            user_id: user_id.into(),
            template_id: template.id.clone(),
            template: TemplateSnapshot::from(template),
            provider: provider.into(),
            model: model.into(),
            variables,
            count,
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
            results: Vec::new(),
            prompt_rendered: None,
            usage: UsageTotals::default(),
            created_at: now,
            started_at: None,
            completed_at: None,
            metadata: JobMetadata {
                template_name: template.name.clone(),
                validation_warnings,
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        let allowed = match (self.status, to) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (from, JobStatus::Failed | JobStatus::Cancelled) => from.is_active(),
            _ => false,
        };
        if !allowed {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `pending -> processing`, progress 10.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        self.started_at = Some(now);
        self.progress = 10;
        Ok(())
    }

    /// Progress before item `i` (0-based): `10 + floor(i / count * 80)`.
    pub fn item_progress(index: u32, count: u32) -> u8 {
        if count == 0 {
            return 10;
        }
        (10 + (u64::from(index) * 80 / u64::from(count))) as u8
    }

    /// Append an item result; only legal while processing.
    pub fn push_result(&mut self, outcome: ItemOutcome) -> Result<(), TransitionError> {
        if self.status != JobStatus::Processing || self.results.len() >= self.count as usize {
            return Err(TransitionError {
                from: self.status,
                to: self.status,
            });
        }
        self.results.push(outcome);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 100;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Job-level failure. No partial credit: progress drops to 0.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(message.into());
        self.progress = 0;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.error_message = Some(CANCELLED_MESSAGE.to_string());
        self.completed_at = Some(now);
        Ok(())
    }

    /// Result list as plain mappings, as handed to the exporter.
    pub fn result_maps(&self) -> Vec<Map<String, Value>> {
        self.results.iter().map(ItemOutcome::to_map).collect()
    }
}
