//! Shared fixtures for forge integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use forge::api::AppState;
use forge::auth::JwtManager;
use chrono::{DateTime, Utc};
use forge::db::models::{GenerationJob, ItemOutcome, JobStatus};
use forge::db::{DbResult, GenerationStore, JobFilter, MemoryStore, Page, Stores};
use forge::error::Result;
use forge::execution::{JobDispatcher, JobHandle, JobProcessor, WorkerConfig};
use forge::services::{GenerationService, TemplateService};
use futures::stream;
use llm::{
    ChunkStream, ConnectionStatus, GenerationOutput, GenerationRequest, LlmError, LlmProvider,
    ModelInfo, ProviderRegistry, StreamChunk, TokenUsage,
};
use serde_json::{json, Map, Value};
use templates::{Renderer, Template, TemplateDraft, Validator};
use tokio::sync::{oneshot, Semaphore};

pub const SECRET: &str = "test-secret";

/// Scripted provider that records every request it receives.
///
/// Calls are numbered from 1. Calls listed in `fail_on` return an upstream
/// error; every other call answers with `reply`, optionally with `{n}`
/// replaced by the call number.
#[derive(Clone)]
pub struct MockProvider {
    pub requests: Arc<Mutex<Vec<GenerationRequest>>>,
    fail_on: HashSet<usize>,
    reply: String,
    usage: Option<TokenUsage>,
    cost: Option<f64>,
    gate: Option<Arc<Semaphore>>,
}

impl MockProvider {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_on: HashSet::new(),
            reply: reply.into(),
            usage: None,
            cost: None,
            gate: None,
        }
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on = calls.iter().copied().collect();
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage, cost: f64) -> Self {
        self.usage = Some(usage);
        self.cost = Some(cost);
        self
    }

    /// Every call waits for one permit before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn recorded(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock"
    }

    async fn check_connection(&self) -> ConnectionStatus {
        ConnectionStatus::up(1, 1)
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }

    async fn generate(&self, request: GenerationRequest) -> llm::Result<GenerationOutput> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.fail_on.contains(&call) {
            return Err(LlmError::Upstream {
                provider: "mock".to_string(),
                status: 500,
                message: format!("call {} exploded", call),
            });
        }

        let mut output = GenerationOutput::text(request.model, self.reply.replace("{n}", &call.to_string()));
        output.usage = self.usage;
        output.cost = self.cost;
        Ok(output)
    }

    async fn generate_stream(&self, request: GenerationRequest) -> llm::Result<ChunkStream> {
        let output = self.generate(request).await?;
        let chunk = StreamChunk {
            content: output.content,
            finish_reason: Some("stop".to_string()),
        };
        Ok(Box::pin(stream::iter(vec![Ok(chunk)])))
    }
}

/// Dispatcher that only records submissions; tests drive the processor.
#[derive(Default)]
pub struct ManualDispatcher {
    pub submitted: Mutex<Vec<String>>,
    pub senders: Mutex<Vec<oneshot::Sender<Result<JobStatus>>>>,
    pub refuse: bool,
}

impl JobDispatcher for ManualDispatcher {
    fn submit(&self, job_id: &str) -> Result<JobHandle> {
        if self.refuse {
            return Err(forge::ForgeError::Dispatch("queue is full".to_string()));
        }
        let (tx, rx) = oneshot::channel();
        self.submitted.lock().unwrap().push(job_id.to_string());
        self.senders.lock().unwrap().push(tx);
        Ok(JobHandle::new(job_id, rx))
    }
}

/// Services over an in-memory store with a manually driven processor.
pub struct Harness {
    pub stores: Stores,
    pub templates: TemplateService,
    pub generations: GenerationService,
    pub processor: JobProcessor,
    pub dispatcher: Arc<ManualDispatcher>,
    pub provider: MockProvider,
}

impl Harness {
    pub fn new(provider: MockProvider) -> Self {
        Self::with_dispatcher(provider, ManualDispatcher::default())
    }

    pub fn with_dispatcher(provider: MockProvider, dispatcher: ManualDispatcher) -> Self {
        Self::with_stores(provider, dispatcher, Stores::memory())
    }

    /// Jobs go through `jobs` instead of the plain memory store.
    pub fn with_job_store(provider: MockProvider, jobs: Arc<dyn GenerationStore>) -> Self {
        let mut stores = Stores::memory();
        stores.generations = jobs;
        Self::with_stores(provider, ManualDispatcher::default(), stores)
    }

    pub fn with_stores(provider: MockProvider, dispatcher: ManualDispatcher, stores: Stores) -> Self {
        let registry = registry_with(provider.clone());
        let validator = Arc::new(Validator::new());
        let dispatcher = Arc::new(dispatcher);

        Self {
            templates: TemplateService::new(stores.templates.clone(), validator.clone()),
            generations: GenerationService::new(
                stores.templates.clone(),
                stores.generations.clone(),
                validator,
                dispatcher.clone(),
            ),
            processor: JobProcessor::new(stores.generations.clone(), registry, Arc::new(Renderer::new())),
            dispatcher,
            stores,
            provider,
        }
    }

    pub async fn template(&self, owner: &str, draft: Value) -> Template {
        let draft: TemplateDraft = serde_json::from_value(draft).unwrap();
        self.templates.create(owner, draft).await.unwrap().0
    }

    pub async fn job(&self, job_id: &str) -> GenerationJob {
        self.stores.generations.get_job(job_id).await.unwrap().unwrap()
    }
}

/// Memory store that keeps a copy of every job state `save_active` wrote.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    pub saved: Mutex<Vec<GenerationJob>>,
}

impl RecordingStore {
    pub fn snapshots(&self) -> Vec<GenerationJob> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationStore for RecordingStore {
    async fn insert_job(&self, job: &GenerationJob) -> DbResult<()> {
        self.inner.insert_job(job).await
    }

    async fn get_job(&self, job_id: &str) -> DbResult<Option<GenerationJob>> {
        self.inner.get_job(job_id).await
    }

    async fn save_active(&self, job: &GenerationJob) -> DbResult<bool> {
        let written = self.inner.save_active(job).await?;
        if written {
            self.saved.lock().unwrap().push(job.clone());
        }
        Ok(written)
    }

    async fn cancel_active(&self, job_id: &str, now: DateTime<Utc>) -> DbResult<Option<GenerationJob>> {
        self.inner.cancel_active(job_id, now).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Page<GenerationJob>> {
        self.inner.list_jobs(filter).await
    }
}

/// Memory store where the processor gets one more write in right before
/// a cancel lands: an extra item result and progress 50.
#[derive(Default)]
pub struct LateWriteStore {
    inner: MemoryStore,
}

#[async_trait]
impl GenerationStore for LateWriteStore {
    async fn insert_job(&self, job: &GenerationJob) -> DbResult<()> {
        self.inner.insert_job(job).await
    }

    async fn get_job(&self, job_id: &str) -> DbResult<Option<GenerationJob>> {
        self.inner.get_job(job_id).await
    }

    async fn save_active(&self, job: &GenerationJob) -> DbResult<bool> {
        self.inner.save_active(job).await
    }

    async fn cancel_active(&self, job_id: &str, now: DateTime<Utc>) -> DbResult<Option<GenerationJob>> {
        if let Some(mut job) = self.inner.get_job(job_id).await? {
            let index = job.results.len() as u32 + 1;
            let mut item = Map::new();
            item.insert("content".to_string(), json!(format!("late {}", index)));
            if job.push_result(ItemOutcome::Generated(item)).is_ok() {
                job.progress = 50;
                self.inner.save_active(&job).await?;
            }
        }
        self.inner.cancel_active(job_id, now).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Page<GenerationJob>> {
        self.inner.list_jobs(filter).await
    }
}

pub fn registry_with(provider: MockProvider) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();
    registry.register_instance(Arc::new(provider));
    Arc::new(registry)
}

/// Full application state over memory stores and a real worker pool.
pub fn app_state(provider: MockProvider) -> AppState {
    forge::app::assemble(
        Stores::memory(),
        registry_with(provider),
        JwtManager::new(SECRET, 30),
        WorkerConfig::default(),
    )
}

pub fn bearer(user: &str) -> String {
    let token = JwtManager::new(SECRET, 30).issue(user).unwrap();
    format!("Bearer {}", token)
}

pub fn topic_template() -> Value {
    json!({
        "name": "Ideas",
        "category": "content",
        "tags": ["blog"],
        "system_prompt": "You are a helpful assistant.",
        "user_prompt": "Generate {{count}} items about {{topic}}. Item {{index}}.",
        "variables": {
            "count": {"type": "number", "default": 5},
            "topic": {"type": "string"}
        }
    })
}

pub fn json_template() -> Value {
    json!({
        "name": "Quiz",
        "system_prompt": "Answer in JSON.",
        "user_prompt": "Question {{index}} about {{topic}}",
        "variables": {"topic": {"type": "string"}},
        "output_schema": {
            "type": "object",
            "properties": {"question": {"type": "string"}}
        }
    })
}

/// Poll until the job leaves the active states.
pub async fn wait_terminal(state: &AppState, user: &str, job_id: &str) -> GenerationJob {
    for _ in 0..200 {
        let job = state.generations.status(user, job_id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}
