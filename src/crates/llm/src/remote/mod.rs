//! Hosted LLM gateways.
//!
//! Providers here require an API key and bill per token.

pub mod openrouter;

pub use openrouter::OpenRouterClient;
