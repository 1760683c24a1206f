//! Ollama client implementation.
//!
//! Talks to a local Ollama runtime. Models are free, so cost is always zero;
//! token counts come from `prompt_eval_count`/`eval_count` and are estimated
//! from word counts when the runtime omits them.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::local::OllamaClient;
//! use llm::{GenerationRequest, LlmProvider, LocalLlmConfig};
//!
//! let client = OllamaClient::new(LocalLlmConfig::new("http://localhost:11434"))?;
//! let output = client
//!     .generate(GenerationRequest::new("llama3:8b", "", "Hello!"))
//!     .await?;
//! ```

use crate::config::LocalLlmConfig;
use crate::error::{LlmError, Result};
use crate::provider::{
    ChunkStream, ConnectionStatus, GenerationOutput, GenerationRequest, LlmProvider,
    ResponseFormat, StreamChunk, TokenUsage,
};
use crate::provider_utils::{estimate_tokens, format_size, ModelCapabilities, ModelInfo};
use crate::retry::RetryPolicy;
use crate::stream::line_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

const PROVIDER_ID: &str = "ollama";

/// Ollama client for local LLM inference.
pub struct OllamaClient {
    config: LocalLlmConfig,
    client: Client,
    retry: RetryPolicy,
}

impl OllamaClient {
    /// Registry id.
    pub const ID: &'static str = PROVIDER_ID;

    /// Create a new Ollama client with the given configuration.
    pub fn new(config: LocalLlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::http(PROVIDER_ID, e))?;
        let retry = RetryPolicy::new(config.max_retries);

        Ok(Self {
            config,
            client,
            retry,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn fetch_tags(&self) -> Result<TagsResponse> {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| LlmError::http(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(PROVIDER_ID, status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::invalid_response(PROVIDER_ID, e.to_string()))
    }

    async fn send_chat(&self, body: &ChatRequestBody) -> Result<ChatResponseBody> {
        let url = format!("{}/api/chat", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::http(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(PROVIDER_ID, status.as_u16(), text));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::invalid_response(PROVIDER_ID, e.to_string()))
    }
}

fn build_body(request: &GenerationRequest, stream: bool) -> ChatRequestBody {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: request.system_prompt.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: request.user_prompt.clone(),
    });

    ChatRequestBody {
        model: request.model.clone(),
        messages,
        stream,
        format: match request.response_format {
            ResponseFormat::Json => Some("json"),
            ResponseFormat::Text => None,
        },
        options: ChatOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
    }
}

fn convert_response(request: &GenerationRequest, resp: ChatResponseBody) -> GenerationOutput {
    let prompt_tokens = resp.prompt_eval_count.unwrap_or_else(|| {
        estimate_tokens(&request.system_prompt) + estimate_tokens(&request.user_prompt)
    });
    let completion_tokens = resp
        .eval_count
        .unwrap_or_else(|| estimate_tokens(&resp.message.content));

    GenerationOutput {
        content: resp.message.content,
        model: resp.model,
        usage: Some(TokenUsage::new(prompt_tokens, completion_tokens)),
        cost: Some(0.0),
        finish_reason: resp.done_reason.or_else(|| resp.done.then(|| "stop".to_string())),
    }
}

fn context_length_for(name: &str) -> u64 {
    let name = name.to_lowercase();
    if name.contains("llama3") || name.contains("mistral") {
        8192
    } else if name.contains("qwen") {
        32768
    } else if name.contains("deepseek") {
        16384
    } else {
        crate::provider_utils::DEFAULT_CONTEXT_LENGTH
    }
}

fn convert_model(tag: TagModel) -> ModelInfo {
    let lower = tag.name.to_lowercase();
    let family = tag
        .details
        .and_then(|d| d.family)
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| tag.name.split(':').next().unwrap_or(&tag.name).to_string());
    let context_length = context_length_for(&tag.name);

    ModelInfo::new(tag.name.clone(), PROVIDER_ID)
        .with_name(format!("{} ({})", family, format_size(tag.size.unwrap_or(0))))
        .with_description(format!("Local {} model via Ollama", family))
        .with_context_length(context_length)
        .with_capabilities(ModelCapabilities {
            max_tokens: context_length,
            online: false,
            functions: lower.contains("function") || lower.contains("instruct"),
            vision: lower.contains("vision") || lower.contains("llava"),
        })
}

#[async_trait]
impl LlmProvider for OllamaClient {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn name(&self) -> &str {
        "Ollama"
    }

    async fn check_connection(&self) -> ConnectionStatus {
        let started = Instant::now();
        match self.fetch_tags().await {
            Ok(tags) => ConnectionStatus::up(started.elapsed().as_millis() as u64, tags.models.len()),
            Err(e) => ConnectionStatus::down(format!(
                "Cannot connect to Ollama at {}: {}",
                self.config.base_url, e
            )),
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        match self.fetch_tags().await {
            Ok(tags) => tags.models.into_iter().map(convert_model).collect(),
            Err(e) => {
                warn!(error = %e, base_url = %self.config.base_url, "Ollama catalog unavailable");
                Vec::new()
            }
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        let body = build_body(&request, false);
        debug!(model = %request.model, "Ollama generate");

        let resp = self
            .retry
            .run("ollama.generate", || self.send_chat(&body))
            .await?;
        Ok(convert_response(&request, resp))
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream> {
        let body = build_body(&request, true);
        let url = format!("{}/api/chat", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::http(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(PROVIDER_ID, status.as_u16(), text));
        }

        let lines = line_stream(PROVIDER_ID, response.bytes_stream());
        let chunks = async_stream::try_stream! {
            futures::pin_mut!(lines);
            while let Some(line) = lines.next().await {
                let event: StreamEvent = serde_json::from_str(&line?)?;
                if let Some(message) = event.error {
                    Err::<(), _>(LlmError::invalid_response(PROVIDER_ID, message))?;
                }
                let finish_reason = if event.done {
                    Some(event.done_reason.unwrap_or_else(|| "stop".to_string()))
                } else {
                    None
                };
                let content = event.message.map(|m| m.content).unwrap_or_default();
                yield StreamChunk { content, finish_reason: finish_reason.clone() };
                if finish_reason.is_some() {
                    break;
                }
            }
        };

        Ok(Box::pin(chunks))
    }
}

// Ollama API types
#[derive(Debug, Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    model: String,
    message: ChatMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Debug, Deserialize)]
struct TagDetails {
    #[serde(default)]
    family: Option<String>,
}
