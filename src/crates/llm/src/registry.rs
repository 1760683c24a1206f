//! Provider registry.
//!
//! An explicit object built once at startup and shared by handle. Providers
//! are registered as factories and constructed lazily on first lookup; the
//! constructed instance is cached until the id is re-registered or the
//! cache is cleared.

use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Builds a provider instance on demand.
pub type ProviderFactory = Arc<dyn Fn() -> Result<Arc<dyn LlmProvider>> + Send + Sync>;

/// Mapping from provider id to a lazily constructed, cached instance.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<BTreeMap<String, ProviderFactory>>,
    instances: RwLock<BTreeMap<String, Arc<dyn LlmProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a provider factory. Any cached instance for
    /// the id is dropped.
    pub fn register<F>(&self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn LlmProvider>> + Send + Sync + 'static,
    {
        let id = id.into();
        let mut factories = self.factories.write();
        factories.insert(id.clone(), Arc::new(factory));
        self.instances.write().remove(&id);
        drop(factories);
        debug!(provider = %id, "Registered provider");
    }

    /// Register an already-built instance.
    pub fn register_instance(&self, provider: Arc<dyn LlmProvider>) {
        let id = provider.id().to_string();
        self.register(id, move || Ok(provider.clone()));
    }

    /// Resolve a provider, constructing it on first use.
    pub fn get(&self, id: &str) -> Result<Arc<dyn LlmProvider>> {
        if let Some(instance) = self.instances.read().get(id) {
            return Ok(instance.clone());
        }

        let factory = self
            .factories
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| LlmError::ProviderNotFound(id.to_string()))?;

        let instance = factory()?;
        // Lock order is factories then instances, same as `register`.
        let factories = self.factories.read();
        let current = factories.get(id).is_some_and(|f| Arc::ptr_eq(f, &factory));
        if !current {
            // Re-registered while constructing; never cache a stale instance.
            return Ok(instance);
        }
        // A concurrent caller may have won the race; keep the first instance.
        let mut instances = self.instances.write();
        let cached = instances
            .entry(id.to_string())
            .or_insert_with(|| instance.clone());
        Ok(cached.clone())
    }

    /// Registered provider ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.read().contains_key(id)
    }

    /// Every provider that can be constructed. Construction failures are skipped.
    pub fn all(&self) -> Vec<Arc<dyn LlmProvider>> {
        self.ids()
            .iter()
            .filter_map(|id| match self.get(id) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(provider = %id, error = %e, "Provider construction failed");
                    None
                }
            })
            .collect()
    }

    /// Drop every cached instance; factories stay registered.
    pub fn clear(&self) {
        self.instances.write().clear();
    }
}
