//! Application assembly
//!
//! Turns a [`ServerConfig`] into a running [`AppState`]: provider registry,
//! stores, services and the worker pool that executes generation jobs.

use std::sync::Arc;

use llm::local::OllamaClient;
use llm::remote::OpenRouterClient;
use llm::{LlmProvider, LocalLlmConfig, ProviderRegistry, RemoteLlmConfig};
use templates::{Renderer, Validator};
use tracing::info;

use crate::api::AppState;
use crate::auth::JwtManager;
use crate::config::{ProvidersConfig, ServerConfig};
use crate::db::{DbResult, Stores};
use crate::execution::{JobProcessor, WorkerConfig, WorkerPool};
use crate::services::{GenerationService, ProviderService, TemplateService};

/// Registry with `openrouter` and `ollama` registered from configuration.
/// Clients are built on first use.
pub fn provider_registry(config: &ProvidersConfig) -> Arc<ProviderRegistry> {
    let registry = ProviderRegistry::new();

    let openrouter = config.openrouter.clone();
    registry.register("openrouter", move || {
        let remote = RemoteLlmConfig::new(openrouter.api_key.clone(), openrouter.base_url.clone())
            .with_timeout(openrouter.timeout())
            .with_max_retries(openrouter.max_retries)
            .with_app_name(openrouter.app_name.clone())
            .with_site_url(openrouter.site_url.clone());
        Ok(Arc::new(OpenRouterClient::new(remote)?) as Arc<dyn LlmProvider>)
    });

    let ollama = config.ollama.clone();
    registry.register("ollama", move || {
        let local = LocalLlmConfig::new(ollama.base_url.clone())
            .with_timeout(ollama.timeout());
        Ok(Arc::new(OllamaClient::new(local)?) as Arc<dyn LlmProvider>)
    });

    Arc::new(registry)
}

/// Wire services over `stores` and start the worker pool.
///
/// Must be called inside a tokio runtime.
pub fn assemble(
    stores: Stores,
    registry: Arc<ProviderRegistry>,
    jwt: JwtManager,
    worker: WorkerConfig,
) -> AppState {
    let validator = Arc::new(Validator::new());
    let processor = Arc::new(JobProcessor::new(
        stores.generations.clone(),
        registry.clone(),
        Arc::new(Renderer::new()),
    ));
    let pool = Arc::new(WorkerPool::start(processor, worker));

    AppState {
        templates: Arc::new(TemplateService::new(stores.templates.clone(), validator.clone())),
        generations: Arc::new(GenerationService::new(
            stores.templates.clone(),
            stores.generations.clone(),
            validator,
            pool,
        )),
        providers: Arc::new(ProviderService::new(registry)),
        jwt: Arc::new(jwt),
        db: stores.connection,
    }
}

/// Open the configured database and assemble the application.
pub async fn build(config: &ServerConfig) -> DbResult<AppState> {
    let stores = Stores::open(&config.database.url).await?;
    info!(database = %config.database.url, "Storage ready");

    let registry = provider_registry(&config.providers);
    let jwt = JwtManager::new(&config.auth.jwt_secret, config.auth.token_ttl_minutes);
    Ok(assemble(stores, registry, jwt, config.worker.clone()))
}
