//! Local LLM runtimes.
//!
//! Providers here talk to servers on localhost or the local network. They
//! need no API key and report zero cost.

pub mod ollama;

pub use ollama::OllamaClient;
