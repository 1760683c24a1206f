//! SQLite storage backend

use super::connection::DatabaseConnection;
use super::error::{DatabaseError, DbResult};
use super::models::{timestamp, GenerationJob, GenerationRow, TemplateRow, CANCELLED_MESSAGE};
use super::repositories::{GenerationRepository, TemplateRepository};
use super::store::{GenerationStore, JobFilter, Page, TemplateFilter, TemplateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use templates::Template;

/// [`TemplateStore`] and [`GenerationStore`] over a migrated SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connect and run migrations.
    pub async fn connect(database_url: &str) -> DbResult<Self> {
        let db = DatabaseConnection::new(database_url).await?;
        db.run_migrations().await?;
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl TemplateStore for SqliteStore {
    async fn insert_template(&self, template: &Template) -> DbResult<()> {
        let row = TemplateRow::from_template(template)?;
        TemplateRepository::create(self.db.pool(), &row).await?;
        Ok(())
    }

    async fn get_template(&self, id: &str) -> DbResult<Option<Template>> {
        TemplateRepository::get_by_id(self.db.pool(), id)
            .await?
            .map(TemplateRow::into_template)
            .transpose()
    }

    async fn update_template(&self, template: &Template) -> DbResult<()> {
        let row = TemplateRow::from_template(template)?;
        match TemplateRepository::update(self.db.pool(), &row).await? {
            0 => Err(DatabaseError::not_found(format!("template id={}", template.id))),
            _ => Ok(()),
        }
    }

    async fn delete_template(&self, id: &str) -> DbResult<bool> {
        Ok(TemplateRepository::delete(self.db.pool(), id).await?)
    }

    async fn list_templates(&self, filter: &TemplateFilter) -> DbResult<Page<Template>> {
        let total = TemplateRepository::count(self.db.pool(), filter).await?;
        let items = TemplateRepository::list(self.db.pool(), filter)
            .await?
            .into_iter()
            .map(TemplateRow::into_template)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Page::new(items, total.max(0) as u64, filter.skip, filter.limit))
    }
}

#[async_trait]
impl GenerationStore for SqliteStore {
    async fn insert_job(&self, job: &GenerationJob) -> DbResult<()> {
        let row = GenerationRow::from_job(job)?;
        GenerationRepository::create(self.db.pool(), &row).await?;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> DbResult<Option<GenerationJob>> {
        GenerationRepository::get_by_id(self.db.pool(), job_id)
            .await?
            .map(GenerationRow::into_job)
            .transpose()
    }

    async fn save_active(&self, job: &GenerationJob) -> DbResult<bool> {
        let row = GenerationRow::from_job(job)?;
        if GenerationRepository::update_active(self.db.pool(), &row).await? > 0 {
            return Ok(true);
        }
        if GenerationRepository::exists(self.db.pool(), &job.job_id).await? {
            Ok(false)
        } else {
            Err(DatabaseError::not_found(format!("job_id={}", job.job_id)))
        }
    }

    async fn cancel_active(&self, job_id: &str, now: DateTime<Utc>) -> DbResult<Option<GenerationJob>> {
        let row = GenerationRepository::cancel_active(
            self.db.pool(),
            job_id,
            CANCELLED_MESSAGE,
            &timestamp(&now),
        )
        .await?;
        match row {
            Some(row) => row.into_job().map(Some),
            None if GenerationRepository::exists(self.db.pool(), job_id).await? => Ok(None),
            None => Err(DatabaseError::not_found(format!("job_id={}", job_id))),
        }
    }

    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Page<GenerationJob>> {
        let total = GenerationRepository::count(self.db.pool(), filter).await?;
        let items = GenerationRepository::list(self.db.pool(), filter)
            .await?
            .into_iter()
            .map(GenerationRow::into_job)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Page::new(items, total.max(0) as u64, filter.skip, filter.limit))
    }
}
