//! Server configuration for forge-server
//!
//! Loads `forge.toml`. Every section is optional and falls back to its
//! defaults; a handful of environment variables override file values.

use crate::execution::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerInfoConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_server_name() -> String {
    "forge-server".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `memory` or a `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:forge.db".to_string()
}

/// Bearer token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret (overridden by `JWT_SECRET`)
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_minutes: default_token_ttl(),
        }
    }
}

fn default_token_ttl() -> i64 {
    30
}

/// OpenRouter gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openrouter_url")]
    pub base_url: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openrouter_url(),
            app_name: default_app_name(),
            site_url: default_site_url(),
            timeout_secs: default_remote_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl OpenRouterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_openrouter_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_app_name() -> String {
    "prompt-forge".to_string()
}

fn default_site_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_remote_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

/// Local Ollama runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            timeout_secs: default_local_timeout(),
        }
    }
}

impl OllamaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerInfoConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServerConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ServerConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ServerConfigError> {
        toml::from_str(content).map_err(ServerConfigError::ParseError)
    }

    /// Load configuration from the default locations
    ///
    /// Searches:
    /// 1. `CONFIG_PATH` environment variable
    /// 2. `./config/forge.toml`
    /// 3. `./forge.toml`
    ///
    /// Falls back to defaults when none exists. Environment overrides are
    /// applied in every case.
    pub fn load() -> Result<Self, ServerConfigError> {
        Self::load_from(None)
    }

    /// Like [`load`](ServerConfig::load), with an explicit file taking
    /// precedence over the search.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self, ServerConfigError> {
        let mut config = if let Some(path) = explicit {
            Self::from_file(path)?
        } else if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            Self::from_file(config_path)?
        } else {
            let paths = [PathBuf::from("config/forge.toml"), PathBuf::from("./forge.toml")];
            match paths.iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => {
                    tracing::info!("No configuration file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in [`load`]).
    ///
    /// [`load`]: ServerConfig::load
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ServerConfigError> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ServerConfigError::InvalidConfig(format!("PORT must be a valid u16, got {}", port)))?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(key) = lookup("OPENROUTER_API_KEY") {
            self.providers.openrouter.api_key = key;
        }
        if let Some(url) = lookup("OPENROUTER_BASE_URL") {
            self.providers.openrouter.base_url = url;
        }
        if let Some(url) = lookup("OPENROUTER_SITE_URL") {
            self.providers.openrouter.site_url = url;
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.providers.ollama.base_url = url;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ServerConfigError> {
        if self.auth.token_ttl_minutes <= 0 {
            return Err(ServerConfigError::InvalidConfig(
                "auth.token_ttl_minutes must be positive".to_string(),
            ));
        }
        if self.worker.concurrency == 0 {
            return Err(ServerConfigError::InvalidConfig(
                "worker.concurrency must be at least 1".to_string(),
            ));
        }
        if self.database.url != "memory" && !self.database.url.starts_with("sqlite:") {
            return Err(ServerConfigError::InvalidConfig(format!(
                "database.url must be `memory` or a sqlite: URL, got {}",
                self.database.url
            )));
        }
        Ok(())
    }

    /// Listen address as `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
