//! In-memory storage backend
//!
//! Backs tests and the `memory` database URL. Records live in insertion
//! ordered maps behind `parking_lot` locks; no lock is held across an
//! await point.

use super::error::{DatabaseError, DbResult};
use super::models::GenerationJob;
use super::store::{GenerationStore, JobFilter, Page, TemplateFilter, TemplateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::cmp::Reverse;
use templates::Template;

#[derive(Default)]
pub struct MemoryStore {
    templates: RwLock<IndexMap<String, Template>>,
    jobs: RwLock<IndexMap<String, GenerationJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }
}

fn paginate<T: Clone>(items: Vec<&T>, skip: u32, limit: u32) -> Page<T> {
    let total = items.len() as u64;
    let page = items
        .into_iter()
        .skip(skip as usize)
        .take(limit as usize)
        .cloned()
        .collect();
    Page::new(page, total, skip, limit)
}

#[async_trait]
impl TemplateStore for MemoryStore {
    async fn insert_template(&self, template: &Template) -> DbResult<()> {
        let mut templates = self.templates.write();
        if templates.contains_key(&template.id) {
            return Err(DatabaseError::constraint(format!(
                "template id already exists: {}",
                template.id
            )));
        }
        templates.insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn get_template(&self, id: &str) -> DbResult<Option<Template>> {
        Ok(self.templates.read().get(id).cloned())
    }

    async fn update_template(&self, template: &Template) -> DbResult<()> {
        match self.templates.write().get_mut(&template.id) {
            Some(slot) => {
                *slot = template.clone();
                Ok(())
            }
            None => Err(DatabaseError::not_found(format!("template id={}", template.id))),
        }
    }

    async fn delete_template(&self, id: &str) -> DbResult<bool> {
        Ok(self.templates.write().shift_remove(id).is_some())
    }

    async fn list_templates(&self, filter: &TemplateFilter) -> DbResult<Page<Template>> {
        let templates = self.templates.read();
        let mut matching: Vec<(usize, &Template)> = templates
            .values()
            .enumerate()
            .filter(|(_, t)| filter.matches(t))
            .collect();
        matching.sort_by_key(|(pos, t)| (Reverse(t.updated_at), Reverse(*pos)));
        let items = matching.into_iter().map(|(_, t)| t).collect();
        Ok(paginate(items, filter.skip, filter.limit))
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn insert_job(&self, job: &GenerationJob) -> DbResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.job_id) {
            return Err(DatabaseError::constraint(format!(
                "job_id already exists: {}",
                job.job_id
            )));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> DbResult<Option<GenerationJob>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }

    async fn save_active(&self, job: &GenerationJob) -> DbResult<bool> {
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&job.job_id) {
            Some(stored) if stored.status.is_active() => {
                *stored = job.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(DatabaseError::not_found(format!("job_id={}", job.job_id))),
        }
    }

    async fn cancel_active(&self, job_id: &str, now: DateTime<Utc>) -> DbResult<Option<GenerationJob>> {
        let mut jobs = self.jobs.write();
        let stored = jobs
            .get_mut(job_id)
            .ok_or_else(|| DatabaseError::not_found(format!("job_id={}", job_id)))?;
        match stored.cancel(now) {
            Ok(()) => Ok(Some(stored.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Page<GenerationJob>> {
        let jobs = self.jobs.read();
        let mut matching: Vec<(usize, &GenerationJob)> = jobs
            .values()
            .enumerate()
            .filter(|(_, j)| filter.matches(j))
            .collect();
        matching.sort_by_key(|(pos, j)| (Reverse(j.created_at), Reverse(*pos)));
        let items = matching.into_iter().map(|(_, j)| j).collect();
        Ok(paginate(items, filter.skip, filter.limit))
    }
}
