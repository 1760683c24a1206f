//! Provider catalog and health
//!
//! Aggregates connectivity and model catalogs across every registered
//! provider. A provider that cannot be reached contributes nothing rather
//! than failing the listing.

use crate::error::{ForgeError, Result};
use futures::future::join_all;
use llm::{ConnectionStatus, ModelInfo, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One provider with its live connection status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: String,
    pub name: String,
    pub status: ConnectionStatus,
}

/// Model listing filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelQuery {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub free_only: bool,
    #[serde(default)]
    pub online_only: bool,
}

pub struct ProviderService {
    registry: Arc<ProviderRegistry>,
}

impl ProviderService {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Every provider, connection-checked concurrently.
    pub async fn list_providers(&self) -> Vec<ProviderSummary> {
        let providers = self.registry.all();
        join_all(providers.iter().map(|p| async move {
            ProviderSummary {
                id: p.id().to_string(),
                name: p.name().to_string(),
                status: p.check_connection().await,
            }
        }))
        .await
    }

    /// Models across providers, or from one provider when `query.provider`
    /// is set.
    pub async fn list_models(&self, query: &ModelQuery) -> Result<Vec<ModelInfo>> {
        let providers = match &query.provider {
            Some(id) => vec![self.registry.get(id)?],
            None => self.registry.all(),
        };

        let catalogs = join_all(providers.iter().map(|p| p.list_models())).await;
        let models: Vec<ModelInfo> = catalogs
            .into_iter()
            .flatten()
            .filter(|m| !query.free_only || m.pricing.is_free())
            .filter(|m| !query.online_only || m.capabilities.online)
            .collect();
        debug!(count = models.len(), "Listed models");
        Ok(models)
    }

    /// Look a model up by id in one provider, or in every provider.
    pub async fn get_model(&self, provider: Option<&str>, model_id: &str) -> Result<ModelInfo> {
        let providers = match provider {
            Some(id) => vec![self.registry.get(id)?],
            None => self.registry.all(),
        };
        for p in providers {
            if let Some(model) = p.get_model_info(model_id).await {
                return Ok(model);
            }
        }
        Err(ForgeError::not_found(format!("Model {} not found", model_id)))
    }

    /// Probe a single provider.
    pub async fn test(&self, provider: &str) -> Result<ProviderSummary> {
        let p = self.registry.get(provider)?;
        Ok(ProviderSummary {
            id: p.id().to_string(),
            name: p.name().to_string(),
            status: p.check_connection().await,
        })
    }
}
