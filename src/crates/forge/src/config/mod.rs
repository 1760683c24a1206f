//! Configuration
//!
//! [`ServerConfig`] drives the server binary: listener, database, auth,
//! provider endpoints and worker pool sizing.

pub mod server;

pub use server::{
    AuthConfig, DatabaseConfig, OllamaConfig, OpenRouterConfig, ProvidersConfig, ServerConfig,
    ServerConfigError, ServerInfoConfig,
};
