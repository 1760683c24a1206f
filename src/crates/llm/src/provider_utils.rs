//! Model catalog types and the short-lived catalog cache.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Generation knobs every provider accepts unless its catalog says otherwise.
pub const DEFAULT_SUPPORTED_PARAMETERS: &[&str] = &[
    "temperature",
    "max_tokens",
    "top_p",
    "top_k",
    "frequency_penalty",
    "presence_penalty",
];

/// Fallback context window when a provider does not report one.
pub const DEFAULT_CONTEXT_LENGTH: u64 = 4096;

/// Cost per million tokens. Zero for free and local models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

impl ModelPricing {
    pub fn is_free(&self) -> bool {
        self.input == 0.0 && self.output == 0.0
    }

    /// Estimated cost of a call with the given token counts.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.input + completion_tokens as f64 * self.output) / 1_000_000.0
    }
}

/// What a model can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub max_tokens: u64,
    pub online: bool,
    pub functions: bool,
    pub vision: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            online: false,
            functions: false,
            vision: false,
        }
    }
}

/// Information about an available model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier as the provider expects it.
    pub id: String,

    /// Human-readable model name.
    pub name: String,

    /// Id of the provider serving this model.
    pub provider: String,

    pub description: String,

    pub pricing: ModelPricing,

    pub capabilities: ModelCapabilities,

    pub supported_parameters: Vec<String>,

    pub context_length: u64,
}

impl ModelInfo {
    /// Create a new ModelInfo with just an ID and its provider.
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            description: String::new(),
            pricing: ModelPricing::default(),
            capabilities: ModelCapabilities::default(),
            supported_parameters: DEFAULT_SUPPORTED_PARAMETERS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            context_length: DEFAULT_CONTEXT_LENGTH,
        }
    }

    /// Set the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_pricing(mut self, input: f64, output: f64) -> Self {
        self.pricing = ModelPricing { input, output };
        self
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_context_length(mut self, context_length: u64) -> Self {
        self.context_length = context_length;
        self
    }

    pub fn with_supported_parameters(mut self, params: Vec<String>) -> Self {
        if !params.is_empty() {
            self.supported_parameters = params;
        }
        self
    }
}

struct CacheEntry {
    fetched_at: Instant,
    models: Vec<ModelInfo>,
}

/// Provider-owned catalog cache, invalidated only by TTL expiry.
pub struct ModelCache {
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
}

impl ModelCache {
    /// One hour.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Cached catalog if still fresh.
    pub fn get(&self) -> Option<Vec<ModelInfo>> {
        let guard = self.entry.read();
        guard
            .as_ref()
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.models.clone())
    }

    /// Look up one model in a fresh cache without triggering a fetch.
    pub fn find(&self, model_id: &str) -> Option<ModelInfo> {
        self.get()?.into_iter().find(|m| m.id == model_id)
    }

    pub fn store(&self, models: Vec<ModelInfo>) {
        *self.entry.write() = Some(CacheEntry {
            fetched_at: Instant::now(),
            models,
        });
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a byte count with one decimal, e.g. "3.8 GB".
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Rough token estimate for backends that do not count: words × 1.3.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as f64 * 1.3) as u64
}
