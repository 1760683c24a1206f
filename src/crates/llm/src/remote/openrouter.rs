//! OpenRouter client implementation.
//!
//! OpenRouter is a hosted gateway that routes OpenAI-compatible chat requests
//! to many upstream vendors. The catalog endpoint reports per-token pricing,
//! which is cached for an hour and used to estimate call cost when the
//! response itself carries none.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::remote::OpenRouterClient;
//! use llm::{GenerationRequest, LlmProvider, RemoteLlmConfig};
//!
//! let config = RemoteLlmConfig::from_env("OPENROUTER_API_KEY", "https://openrouter.ai/api/v1")?;
//! let client = OpenRouterClient::new(config)?;
//!
//! let request = GenerationRequest::new("anthropic/claude-3-haiku", "Be terse.", "Hello!");
//! let output = client.generate(request).await?;
//! ```

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::provider::{
    ChunkStream, ConnectionStatus, GenerationOutput, GenerationRequest, LlmProvider,
    ResponseFormat, StreamChunk, TokenUsage,
};
use crate::provider_utils::{ModelCache, ModelCapabilities, ModelInfo};
use crate::retry::RetryPolicy;
use crate::stream::{line_stream, parse_sse_line, SseLine};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, warn};

const PROVIDER_ID: &str = "openrouter";

/// OpenRouter API client.
pub struct OpenRouterClient {
    config: RemoteLlmConfig,
    client: Client,
    retry: RetryPolicy,
    cache: ModelCache,
}

impl OpenRouterClient {
    /// Registry id.
    pub const ID: &'static str = PROVIDER_ID;

    /// Create a new OpenRouter client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::http(PROVIDER_ID, e))?;
        let retry = RetryPolicy::new(config.max_retries);

        Ok(Self {
            config,
            client,
            retry,
            cache: ModelCache::new(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn ensure_key(&self) -> Result<()> {
        if self.config.has_api_key() {
            Ok(())
        } else {
            Err(LlmError::NotConfigured {
                provider: PROVIDER_ID.to_string(),
                message: "OpenRouter API key not configured".to_string(),
            })
        }
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let mut req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        if let Some(site_url) = &self.config.site_url {
            req = req.header("HTTP-Referer", site_url);
        }
        if let Some(app_name) = &self.config.app_name {
            req = req.header("X-Title", app_name);
        }
        req
    }

    async fn fetch_catalog(&self) -> Result<Vec<ModelInfo>> {
        if let Some(models) = self.cache.get() {
            return Ok(models);
        }

        let url = format!("{}/models", self.config.base_url);
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| LlmError::http(PROVIDER_ID, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(PROVIDER_ID, status.as_u16(), body));
        }

        let catalog: CatalogResponse = response
            .json()
            .await
            .map_err(|e| LlmError::invalid_response(PROVIDER_ID, e.to_string()))?;

        let models: Vec<ModelInfo> = catalog.data.into_iter().map(convert_model).collect();
        debug!(count = models.len(), "Fetched OpenRouter catalog");
        self.cache.store(models.clone());
        Ok(models)
    }

    async fn send_chat(&self, body: &ChatRequestBody) -> Result<ChatResponseBody> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .authorized(self.client.post(&url))
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

    /// Convert a chat response, estimating cost from cached pricing when the
    /// gateway did not report it.
    fn convert_response(&self, resp: ChatResponseBody) -> Result<GenerationOutput> {
        if let Some(err) = resp.error {
            return Err(LlmError::Upstream {
                provider: PROVIDER_ID.to_string(),
                status: err.code.unwrap_or(500),
                message: err.message,
            });
        }

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::invalid_response(PROVIDER_ID, "response has no choices"))?;

        let usage = resp
            .usage
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        let cost = resp.usage.as_ref().and_then(|u| u.cost).or_else(|| {
            let usage = usage?;
            let info = self.cache.find(&resp.model)?;
            Some(info.pricing.cost(usage.prompt_tokens, usage.completion_tokens))
        });

        Ok(GenerationOutput {
            content: choice.message.content.unwrap_or_default(),
            model: resp.model,
            usage,
            cost,
            finish_reason: choice.finish_reason,
        })
    }
}

fn build_body(request: &GenerationRequest, stream: bool) -> ChatRequestBody {
    let mut messages = Vec::with_capacity(2);
    if !request.system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: Some(request.system_prompt.clone()),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: Some(request.user_prompt.clone()),
    });

    ChatRequestBody {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        response_format: match request.response_format {
            ResponseFormat::Json => Some(ResponseFormatBody {
                kind: "json_object".to_string(),
            }),
            ResponseFormat::Text => None,
        },
        stream,
    }
}

fn price(value: &Option<Value>) -> f64 {
    let per_token = match value {
        Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    };
    // Catalog prices are per token; ModelInfo uses per million.
    per_token.max(0.0) * 1_000_000.0
}

fn convert_model(raw: CatalogModel) -> ModelInfo {
    let description = raw.description.unwrap_or_default();
    let desc = description.to_lowercase();
    let id = raw.id.to_lowercase();
    let context_length = raw.context_length.unwrap_or(crate::provider_utils::DEFAULT_CONTEXT_LENGTH);

    let online = ["online", "internet", "search"].iter().any(|k| desc.contains(k))
        || ["perplexity", "anthropic/claude-3", "gpt-4"].iter().any(|k| id.contains(k));
    let functions = desc.contains("function") || raw.supported_parameters.iter().any(|p| p == "tools");
    let vision = desc.contains("vision") || desc.contains("image");

    let (input, output) = raw
        .pricing
        .as_ref()
        .map(|p| (price(&p.prompt), price(&p.completion)))
        .unwrap_or((0.0, 0.0));

    ModelInfo::new(raw.id.clone(), PROVIDER_ID)
        .with_name(raw.name.unwrap_or_else(|| raw.id.clone()))
        .with_description(description)
        .with_pricing(input, output)
        .with_context_length(context_length)
        .with_capabilities(ModelCapabilities {
            max_tokens: context_length.min(4096),
            online,
            functions,
            vision,
        })
        .with_supported_parameters(raw.supported_parameters)
}

#[async_trait]
impl LlmProvider for OpenRouterClient {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn name(&self) -> &str {
        "OpenRouter"
    }

    async fn check_connection(&self) -> ConnectionStatus {
        if let Err(e) = self.ensure_key() {
            return match e {
                LlmError::NotConfigured { message, .. } => ConnectionStatus::down(message),
                other => ConnectionStatus::down(other.to_string()),
            };
        }

        let started = Instant::now();
        match self.fetch_catalog().await {
            Ok(models) => ConnectionStatus::up(started.elapsed().as_millis() as u64, models.len()),
            Err(e) => ConnectionStatus::down(e.to_string()),
        }
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        match self.fetch_catalog().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "OpenRouter catalog unavailable");
                Vec::new()
            }
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput> {
        self.ensure_key()?;
        let body = build_body(&request, false);
        debug!(model = %request.model, "OpenRouter generate");

        let resp = self
            .retry
            .run("openrouter.generate", || self.send_chat(&body))
            .await?;
        self.convert_response(resp)
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream> {
        self.ensure_key()?;
        let body = build_body(&request, true);
        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .authorized(self.client.post(&url))
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
                let line = line?;
                match parse_sse_line(&line) {
                    Some(SseLine::Done) => break,
                    Some(SseLine::Data(payload)) => {
                        let event: StreamEvent = serde_json::from_str(payload)?;
                        if let Some(choice) = event.choices.into_iter().next() {
                            let finished = choice.finish_reason.is_some();
                            yield StreamChunk {
                                content: choice.delta.content.unwrap_or_default(),
                                finish_reason: choice.finish_reason,
                            };
                            if finished {
                                break;
                            }
                        }
                    }
                    None => {}
                }
            }
        };

        Ok(Box::pin(chunks))
    }
}

// OpenRouter API types (OpenAI-compatible with extensions)
#[derive(Debug, Serialize)]
struct ChatRequestBody {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormatBody {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    cost: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
    #[serde(default)]
    code: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    data: Vec<CatalogModel>,
}

#[derive(Debug, Deserialize)]
struct CatalogModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    pricing: Option<CatalogPricing>,
    #[serde(default)]
    supported_parameters: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogPricing {
    #[serde(default)]
    prompt: Option<Value>,
    #[serde(default)]
    completion: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(key: &str) -> OpenRouterClient {
        OpenRouterClient::new(RemoteLlmConfig::new(key, "https://openrouter.ai/api/v1")).unwrap()
    }

    fn catalog_model(value: Value) -> CatalogModel {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_convert_model_pricing_and_capabilities() {
        let info = convert_model(catalog_model(json!({
            "id": "perplexity/sonar",
            "name": "Sonar",
            "description": "Answers with internet search and image understanding",
            "context_length": 127072,
            "pricing": {"prompt": "0.000001", "completion": "0.000002"},
            "supported_parameters": ["temperature", "tools"]
        })));

        assert_eq!(info.provider, "openrouter");
        assert_eq!(info.name, "Sonar");
        assert!((info.pricing.input - 1.0).abs() < 1e-9);
        assert!((info.pricing.output - 2.0).abs() < 1e-9);
        assert!(info.capabilities.online);
        assert!(info.capabilities.vision);
        assert!(info.capabilities.functions);
        assert_eq!(info.capabilities.max_tokens, 4096);
        assert_eq!(info.context_length, 127072);
        assert_eq!(info.supported_parameters, vec!["temperature", "tools"]);
    }

    #[test]
    fn test_convert_model_defaults() {
        let info = convert_model(catalog_model(json!({"id": "meta/llama-3-8b:free", "context_length": 2048})));
        assert_eq!(info.name, "meta/llama-3-8b:free");
        assert!(info.pricing.is_free());
        assert!(!info.capabilities.online);
        assert_eq!(info.capabilities.max_tokens, 2048);
        assert_eq!(info.supported_parameters.len(), 6);
    }

    #[test]
    fn test_build_body_json_format() {
        let request = GenerationRequest::new("openai/gpt-4o", "You are terse.", "Hi")
            .with_response_format(ResponseFormat::Json);
        let body = serde_json::to_value(build_body(&request, false)).unwrap();
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Hi");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_build_body_skips_empty_system_prompt() {
        let request = GenerationRequest::new("m", "", "Hi");
        let body = serde_json::to_value(build_body(&request, true)).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body.get("response_format").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_convert_response_estimates_cost_from_cache() {
        let client = client("key");
        client
            .cache
            .store(vec![ModelInfo::new("m", PROVIDER_ID).with_pricing(2.0, 4.0)]);

        let resp: ChatResponseBody = serde_json::from_value(json!({
            "model": "m",
            "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 500000, "completion_tokens": 250000, "total_tokens": 750000}
        }))
        .unwrap();

        let output = client.convert_response(resp).unwrap();
        assert_eq!(output.content, "hello");
        assert_eq!(output.usage.unwrap().total_tokens, 750000);
        assert!((output.cost.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_response_errors() {
        let client = client("key");
        let empty: ChatResponseBody = serde_json::from_value(json!({"model": "m", "choices": []})).unwrap();
        assert!(matches!(
            client.convert_response(empty),
            Err(LlmError::InvalidResponse { .. })
        ));

        let failed: ChatResponseBody =
            serde_json::from_value(json!({"error": {"message": "upstream down", "code": 502}})).unwrap();
        assert!(matches!(
            client.convert_response(failed),
            Err(LlmError::Upstream { status: 502, .. })
        ));
    }

    #[test]
    fn test_attribution_headers() {
        let config = RemoteLlmConfig::new("sk-test", "https://openrouter.ai/api/v1")
            .with_app_name("prompt-forge")
            .with_site_url("http://localhost:8000");
        let attributed = OpenRouterClient::new(config).unwrap();
        let request = attributed
            .authorized(attributed.client.get("https://openrouter.ai/api/v1/models"))
            .build()
            .unwrap();
        let headers = request.headers();
        assert_eq!(headers["Authorization"], "Bearer sk-test");
        assert_eq!(headers["HTTP-Referer"], "http://localhost:8000");
        assert_eq!(headers["X-Title"], "prompt-forge");

        let bare = client("sk-test");
        let request = bare
            .authorized(bare.client.get("https://openrouter.ai/api/v1/models"))
            .build()
            .unwrap();
        assert!(request.headers().get("HTTP-Referer").is_none());
        assert!(request.headers().get("X-Title").is_none());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let client = client("");
        let status = client.check_connection().await;
        assert!(!status.available);
        assert_eq!(status.error.as_deref(), Some("OpenRouter API key not configured"));

        let err = client
            .generate(GenerationRequest::new("m", "s", "u"))
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(err.provider(), Some("openrouter"));
    }
}
