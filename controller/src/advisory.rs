//! Advisory service clients. Every provider sits behind [`AdvisoryClient`];
//! the optimizer never branches on which one is configured.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use aircon_common::{
    parse_advice, AdvisoryConfig, AdvisoryError, AdvisoryProvider, AdvisoryRequest,
    AdvisoryResponse, ModelTier,
};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const MAX_TOKENS: u32 = 1024;

#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn advise(&self, request: &AdvisoryRequest) -> Result<AdvisoryResponse, AdvisoryError>;
}

/// Builds the configured client, or `None` when the service is disabled.
pub fn build_client(config: &AdvisoryConfig) -> anyhow::Result<Option<Arc<dyn AdvisoryClient>>> {
    if !config.enabled() {
        return Ok(None);
    }

    let http = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build advisory http client")?;

    let client: Arc<dyn AdvisoryClient> = match config.provider {
        AdvisoryProvider::None => return Ok(None),
        AdvisoryProvider::Anthropic => Arc::new(AnthropicAdvisor {
            http,
            api_key: config.api_key.clone(),
            base_url: base_url_or(&config.base_url, ANTHROPIC_BASE_URL),
            model: model_or(&config.model, config.tier, AdvisoryProvider::Anthropic),
        }),
        AdvisoryProvider::OpenAi => Arc::new(OpenAiAdvisor {
            http,
            api_key: config.api_key.clone(),
            base_url: base_url_or(&config.base_url, OPENAI_BASE_URL),
            model: model_or(&config.model, config.tier, AdvisoryProvider::OpenAi),
        }),
    };
    Ok(Some(client))
}

fn base_url_or(configured: &str, default: &str) -> String {
    let configured = configured.trim().trim_end_matches('/');
    if configured.is_empty() {
        default.to_string()
    } else {
        configured.to_string()
    }
}

fn model_or(configured: &str, tier: ModelTier, provider: AdvisoryProvider) -> String {
    if !configured.trim().is_empty() {
        return configured.trim().to_string();
    }
    let model = match (provider, tier) {
        (AdvisoryProvider::OpenAi, ModelTier::Fast) => "gpt-4o-mini",
        (AdvisoryProvider::OpenAi, ModelTier::Balanced) => "gpt-4o",
        (_, ModelTier::Fast) => "claude-3-5-haiku-latest",
        (_, ModelTier::Balanced) => "claude-sonnet-4-5",
    };
    model.to_string()
}

fn status_error(status: StatusCode, body: &str) -> AdvisoryError {
    let detail: String = body.chars().take(200).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AdvisoryError::Unavailable(format!("authentication rejected ({status})"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => AdvisoryError::Timeout,
        _ => AdvisoryError::Unavailable(format!("api error {status}: {detail}")),
    }
}

fn transport_error(err: reqwest::Error) -> AdvisoryError {
    if err.is_timeout() {
        AdvisoryError::Timeout
    } else {
        AdvisoryError::Unavailable(err.to_string())
    }
}

async fn send(builder: reqwest::RequestBuilder) -> Result<String, AdvisoryError> {
    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    Ok(body)
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct AnthropicAdvisor {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[async_trait]
impl AdvisoryClient for AnthropicAdvisor {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    async fn advise(&self, request: &AdvisoryRequest) -> Result<AdvisoryResponse, AdvisoryError> {
        let prompt = request.prompt();
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let raw = send(
            self.http
                .post(format!("{}/v1/messages", self.base_url))
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
        )
        .await?;

        let response: MessagesResponse = serde_json::from_str(&raw)
            .map_err(|err| AdvisoryError::MalformedResponse(err.to_string()))?;
        let text: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        parse_advice(&text, request)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiAdvisor {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[async_trait]
impl AdvisoryClient for OpenAiAdvisor {
    fn provider(&self) -> &'static str {
        "openai"
    }

    async fn advise(&self, request: &AdvisoryRequest) -> Result<AdvisoryResponse, AdvisoryError> {
        let prompt = request.prompt();
        let body = ChatCompletionRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let raw = send(
            self.http
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body),
        )
        .await?;

        let response: ChatCompletionResponse = serde_json::from_str(&raw)
            .map_err(|err| AdvisoryError::MalformedResponse(err.to_string()))?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AdvisoryError::MalformedResponse("empty completion".into()))?;
        parse_advice(&text, request)
    }
}
