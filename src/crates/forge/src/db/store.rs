//! Storage contracts
//!
//! The services only see these two traits. [`crate::db::MemoryStore`] and
//! [`crate::db::SqliteStore`] implement both.

use super::error::DbResult;
use super::models::{GenerationJob, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use templates::Template;

/// Default page size for listings.
pub const DEFAULT_LIMIT: u32 = 20;
/// Largest page a caller may request.
pub const MAX_LIMIT: u32 = 100;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub skip: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, skip: u32, limit: u32) -> Self {
        Self {
            items,
            total,
            skip,
            limit,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Template listing filter.
#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    /// Caller: sees own templates plus public ones
    pub viewer: String,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub is_public: Option<bool>,
    pub skip: u32,
    pub limit: u32,
}

impl TemplateFilter {
    pub fn for_viewer(viewer: impl Into<String>) -> Self {
        Self {
            viewer: viewer.into(),
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    pub fn matches(&self, template: &Template) -> bool {
        template.is_visible_to(&self.viewer)
            && self.category.as_ref().map_or(true, |c| &template.category == c)
            && self.tag.as_ref().map_or(true, |t| template.tags.contains(t))
            && self.is_public.map_or(true, |p| template.is_public == p)
    }
}

/// Job history filter. Always scoped to one user.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub user_id: String,
    pub status: Option<JobStatus>,
    pub template_id: Option<String>,
    pub skip: u32,
    pub limit: u32,
}

impl JobFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &GenerationJob) -> bool {
        job.user_id == self.user_id
            && self.status.map_or(true, |s| job.status == s)
            && self.template_id.as_ref().map_or(true, |t| &job.template_id == t)
    }
}

/// Template persistence.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn insert_template(&self, template: &Template) -> DbResult<()>;

    async fn get_template(&self, id: &str) -> DbResult<Option<Template>>;

    /// Replace a stored template. `NotFound` if absent.
    async fn update_template(&self, template: &Template) -> DbResult<()>;

    /// Returns whether a row was removed.
    async fn delete_template(&self, id: &str) -> DbResult<bool>;

    /// Newest-updated first.
    async fn list_templates(&self, filter: &TemplateFilter) -> DbResult<Page<Template>>;
}

/// Generation job persistence.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    /// `ConstraintViolation` when `job_id` is taken.
    async fn insert_job(&self, job: &GenerationJob) -> DbResult<()>;

    async fn get_job(&self, job_id: &str) -> DbResult<Option<GenerationJob>>;

    /// Overwrite the stored job only while the stored copy is still
    /// pending or processing. Returns whether the write happened.
    async fn save_active(&self, job: &GenerationJob) -> DbResult<bool>;

    /// Cancel the stored job in place while it is still pending or
    /// processing. Only `status`, `error_message` and `completed_at`
    /// change; results and progress written by the processor are kept.
    /// Returns the cancelled job, or `None` when it was already terminal.
    async fn cancel_active(&self, job_id: &str, now: DateTime<Utc>) -> DbResult<Option<GenerationJob>>;

    /// Newest first.
    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Page<GenerationJob>>;
}
