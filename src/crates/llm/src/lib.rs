//! LLM provider abstraction for prompt-forge.
//!
//! This crate defines the [`LlmProvider`] contract shared by every backend,
//! the [`ModelInfo`] catalog types, and a [`ProviderRegistry`] that resolves
//! provider ids to lazily constructed, cached instances.
//!
//! # Local Providers
//!
//! - **Ollama** - local model runtime, free, usage counted by the runtime
//!
//! # Remote Providers
//!
//! - **OpenRouter** - hosted multi-model gateway with per-token pricing
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use llm::local::OllamaClient;
//! use llm::{GenerationRequest, LocalLlmConfig, ProviderRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ProviderRegistry::new();
//!     registry.register("ollama", || {
//!         Ok(Arc::new(OllamaClient::new(LocalLlmConfig::new("http://localhost:11434"))?) as _)
//!     });
//!
//!     let provider = registry.get("ollama")?;
//!     let output = provider
//!         .generate(GenerationRequest::new("llama3:8b", "Be brief.", "What is Rust?"))
//!         .await?;
//!     println!("{}", output.content);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod provider_utils;
pub mod registry;
pub mod retry;

mod stream;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;

// Re-export commonly used types
pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use provider::{
    ChunkStream, ConnectionStatus, GenerationOutput, GenerationRequest, LlmProvider,
    ResponseFormat, StreamChunk, TokenUsage,
};
pub use provider_utils::{ModelCache, ModelCapabilities, ModelInfo, ModelPricing};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use retry::RetryPolicy;
