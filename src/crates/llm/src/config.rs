//! Common configuration structures for LLM providers.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for local LLM runtimes (Ollama).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalLlmConfig {
    /// Base URL for the local LLM server, e.g. "http://localhost:11434".
    pub base_url: String,

    /// Request timeout duration. Local generation is slow, so this is generous.
    #[serde(default = "default_local_timeout")]
    pub timeout: Duration,

    /// Timeout for the lightweight connectivity probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: Duration,

    /// Maximum retries for failed requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl LocalLlmConfig {
    /// Create a new local LLM configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base(base_url.into()),
            timeout: default_local_timeout(),
            probe_timeout: default_probe_timeout(),
            max_retries: default_max_retries(),
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Configuration for hosted gateways (OpenRouter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLlmConfig {
    /// API key for authentication. May be empty when the key is not configured;
    /// the client then reports itself unavailable instead of failing to build.
    pub api_key: String,

    /// Base URL for the API, e.g. "https://openrouter.ai/api/v1".
    pub base_url: String,

    /// Request timeout duration.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,

    /// Maximum retries for failed requests.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Application name sent as the `X-Title` attribution header.
    pub app_name: Option<String>,

    /// Site URL sent as the `HTTP-Referer` attribution header.
    #[serde(default)]
    pub site_url: Option<String>,
}

impl RemoteLlmConfig {
    /// Create a new remote LLM configuration.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: trim_base(base_url.into()),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            app_name: None,
            site_url: None,
        }
    }

    /// Create configuration from environment variable.
    pub fn from_env(env_var: &str, base_url: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(env_var).map_err(|_| LlmError::NotConfigured {
            provider: "config".to_string(),
            message: format!("environment variable {} is not set", env_var),
        })?;

        Ok(Self::new(api_key, base_url))
    }

    /// Whether an API key is present.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the application name.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// Set the site URL used for referer attribution.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into());
        self
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_local_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_retries() -> u32 {
    2
}
