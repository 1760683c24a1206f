//! The uniform provider contract.
//!
//! Every backend implements [`LlmProvider`]. The trait covers connectivity
//! probing, catalog listing, blocking generation and streaming generation.
//! Catalog and connectivity calls never fail: transport problems collapse
//! into an unavailable [`ConnectionStatus`] or an empty model list.

use crate::error::Result;
use crate::provider_utils::ModelInfo;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Output shape requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// A single generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default)]
    pub response_format: ResponseFormat,
}

impl GenerationRequest {
    /// Default sampling temperature when the template does not set one.
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    /// Default completion budget when the template does not set one.
    pub const DEFAULT_MAX_TOKENS: u32 = 1000;

    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: Self::DEFAULT_TEMPERATURE,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            response_format: ResponseFormat::Text,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Result of a blocking generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub cost: Option<f64>,
    pub finish_reason: Option<String>,
}

impl GenerationOutput {
    pub fn text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: None,
            cost: None,
            finish_reason: None,
        }
    }
}

/// One increment of a streamed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub content: String,
    pub finish_reason: Option<String>,
}

impl StreamChunk {
    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// Finite stream of chunks; ends after the upstream signals completion.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Outcome of a connectivity probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models_count: Option<usize>,
}

impl ConnectionStatus {
    pub fn up(response_time_ms: u64, models_count: usize) -> Self {
        Self {
            available: true,
            response_time_ms: Some(response_time_ms),
            error: None,
            models_count: Some(models_count),
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            available: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Uniform interface over LLM backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable registry id, e.g. "openrouter".
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Lightweight round trip for health display. Never fails.
    async fn check_connection(&self) -> ConnectionStatus;

    /// Fetch the model catalog. Transport failures yield an empty list.
    async fn list_models(&self) -> Vec<ModelInfo>;

    /// Look up a single model in the catalog.
    async fn get_model_info(&self, model_id: &str) -> Option<ModelInfo> {
        self.list_models()
            .await
            .into_iter()
            .find(|m| m.id == model_id)
    }

    /// Single blocking round trip.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput>;

    /// Lazily streamed generation.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream>;
}
