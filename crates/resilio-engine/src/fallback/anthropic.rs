//! Reasoning service backed by the Anthropic Messages API.

use super::{ReasoningError, ReasoningRequest, ReasoningService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 512;
const MAX_ERROR_LEN: usize = 300;

#[derive(Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Image { source: ImageSource },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    r#type: String,
    message: String,
}

pub struct AnthropicReasoner {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicReasoner {
    pub fn new(config: AnthropicConfig) -> Result<Self, ReasoningError> {
        if config.api_key.trim().is_empty() {
            return Err(ReasoningError::NotConfigured("API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ReasoningError::Network(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request(&self, request: &ReasoningRequest) -> MessagesRequest {
        let mut content = Vec::with_capacity(2);
        if let Some(data) = &request.snapshot.screenshot_jpeg {
            content.push(RequestBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: "image/jpeg",
                    data: data.clone(),
                },
            });
        }
        content.push(RequestBlock::Text {
            text: request.prompt(),
        });

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![Message {
                role: "user",
                content,
            }],
        }
    }
}

#[async_trait]
impl ReasoningService for AnthropicReasoner {
    async fn suggest(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        debug!(model = %self.config.model, action_key = %request.action_key, "sending reasoning request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| ReasoningError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReasoningError::Network(e.to_string()))?;

        if status.as_u16() == 429 {
            return Err(ReasoningError::RateLimit);
        }
        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => format!("{}: {}", err.error.r#type, err.error.message),
                Err(_) => format!("HTTP {status}: {body}"),
            };
            return Err(ReasoningError::Api(sanitize_api_error(&message)));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| ReasoningError::InvalidResponse(e.to_string()))?;
        reply_text(parsed)
    }
}

fn reply_text(response: MessagesResponse) -> Result<String, ReasoningError> {
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            ResponseBlock::Other => None,
        })
        .collect();
    if text.is_empty() {
        return Err(ReasoningError::InvalidResponse(
            "no text block in reply".into(),
        ));
    }
    Ok(text.join("\n"))
}

/// Strip credential details from API errors before they reach logs.
fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("api key")
        || lower.contains("x-api-key")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
    {
        return "authentication failed; check the configured API key".to_string();
    }
    if lower.contains("overloaded") {
        return "service overloaded; try again later".to_string();
    }
    super::snapshot::truncate_chars(error, MAX_ERROR_LEN)
}
