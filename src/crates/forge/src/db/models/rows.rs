//! SQLite row models
//!
//! Templates and jobs are stored as JSON documents in a `body` column next
//! to the columns the queries filter and sort on. Timestamps are RFC 3339
//! strings with microsecond precision so they sort lexically.

use super::generation::{GenerationJob, StoredJob};
use crate::db::error::{DatabaseError, DbResult};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::FromRow;
use templates::Template;

/// Sortable timestamp string.
pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A row of the `templates` table
#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub category: String,
    /// 0 or 1
    pub is_public: i64,
    /// JSON array of tag strings
    pub tags: String,
    pub created_at: String,
    pub updated_at: String,
    /// Full template document
    pub body: String,
}

impl TemplateRow {
    pub fn from_template(template: &Template) -> DbResult<Self> {
        Ok(Self {
            id: template.id.clone(),
            owner_id: template.owner_id.clone(),
            name: template.name.clone(),
            category: template.category.clone(),
            is_public: i64::from(template.is_public),
            tags: serde_json::to_string(&template.tags)?,
            created_at: timestamp(&template.created_at),
            updated_at: timestamp(&template.updated_at),
            body: serde_json::to_string(template)?,
        })
    }

    pub fn into_template(self) -> DbResult<Template> {
        serde_json::from_str(&self.body).map_err(DatabaseError::from)
    }
}

/// A row of the `generations` table
#[derive(Debug, Clone, FromRow)]
pub struct GenerationRow {
    pub job_id: String,
    pub user_id: String,
    pub template_id: String,
    /// Job status string, see [`super::JobStatus::as_str`]
    pub status: String,
    pub created_at: String,
    /// Full job document including the template snapshot
    pub body: String,
}

impl GenerationRow {
    pub fn from_job(job: &GenerationJob) -> DbResult<Self> {
        Ok(Self {
            job_id: job.job_id.clone(),
            user_id: job.user_id.clone(),
            template_id: job.template_id.clone(),
            status: job.status.as_str().to_string(),
            created_at: timestamp(&job.created_at),
            body: StoredJob::encode(job)?,
        })
    }

    pub fn into_job(self) -> DbResult<GenerationJob> {
        StoredJob::decode(&self.body).map_err(DatabaseError::from)
    }
}
