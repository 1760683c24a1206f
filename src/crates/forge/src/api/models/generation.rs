//! Generation API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::validation::validate_pagination;
use crate::db::models::{GenerationJob, JobStatus};
use crate::db::{JobFilter, DEFAULT_LIMIT, MAX_LIMIT};
use crate::export::ExportFormat;
use crate::services::BatchEntry;

/// Summary returned when a job is accepted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub template_id: String,
    pub provider: String,
    pub model: String,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}

impl From<&GenerationJob> for GenerationResponse {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            template_id: job.template_id.clone(),
            provider: job.provider.clone(),
            model: job.model.clone(),
            progress: job.progress,
            created_at: job.created_at,
        }
    }
}

/// Request body for POST /api/v1/generate/batch
///
/// Entries stay raw JSON so that one malformed entry is rejected by itself
/// instead of failing the whole body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub generations: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub jobs: Vec<BatchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub message: String,
}

/// Query parameters for GET /api/v1/history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub template_id: Option<String>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

impl HistoryQuery {
    pub fn into_filter(self, user_id: &str) -> ApiResult<JobFilter> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        validate_pagination(limit, MAX_LIMIT)?;

        let status = self
            .status
            .map(|s| s.parse::<JobStatus>())
            .transpose()
            .map_err(ApiError::ValidationError)?;

        let mut filter = JobFilter::for_user(user_id);
        filter.status = status;
        filter.template_id = self.template_id;
        filter.skip = self.skip.unwrap_or(0);
        filter.limit = limit;
        Ok(filter)
    }
}

/// Query parameters for GET /api/v1/generate/:job_id/export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

impl ExportQuery {
    /// Requested format, `json` when absent
    pub fn format(&self) -> ApiResult<ExportFormat> {
        match &self.format {
            None => Ok(ExportFormat::Json),
            Some(name) => name.parse().map_err(ApiError::BadRequest),
        }
    }
}
