use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::error::AiError;
use crate::config::AiConfig;
use crate::sanitize::truncate_chars;

/// Retries on HTTP 429 before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Longest error body kept in [`AiError::Api`].
const MAX_ERROR_BODY_CHARS: usize = 300;

/// One piece of the user message.
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    PngImage(Vec<u8>),
}

/// A single chat completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub parts: Vec<ContentPart>,
    /// Ask the service for a JSON object response.
    pub json_response: bool,
}

/// Anything that can answer a [`CompletionRequest`] with the assistant's text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError>;
}

// ── Wire types (OpenAI-compatible chat completions) ──

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct AiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl AiClient {
    pub fn new(config: &AiConfig, api_key: SecretString) -> Result<Self, AiError> {
        let http = Client::builder()
            .user_agent(concat!("playscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_millis(config.request_timeout_ms),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        })
    }

    fn build_body(&self, request: CompletionRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: MessageContent::Text(system),
            });
        }

        let content = match request.parts.as_slice() {
            [ContentPart::Text(text)] => MessageContent::Text(text.clone()),
            _ => MessageContent::Parts(request.parts.into_iter().map(to_wire_part).collect()),
        };
        messages.push(ChatMessage {
            role: "user",
            content,
        });

        ChatRequest {
            model: request.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: request.json_response.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut attempt = 0;

        loop {
            let response = self
                .http
                .post(&url)
                .bearer_auth(self.api_key.expose_secret())
                .json(body)
                .send()
                .await
                .map_err(|e| AiError::Http(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 429 {
                if attempt >= MAX_RATE_LIMIT_RETRIES {
                    return Err(AiError::RateLimited {
                        attempts: attempt + 1,
                    });
                }
                let wait =
                    retry_after(response.headers()).unwrap_or_else(|| backoff_delay(attempt));
                tracing::warn!(
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Remote AI rate limited"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AiError::Api {
                    status: status.as_u16(),
                    body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
                });
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| AiError::Decode(e.to_string()))?;

            return parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or(AiError::EmptyResponse);
        }
    }
}

#[async_trait]
impl CompletionBackend for AiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        let body = self.build_body(request);
        match tokio::time::timeout(self.timeout, self.send(&body)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

fn to_wire_part(part: ContentPart) -> WirePart {
    match part {
        ContentPart::Text(text) => WirePart::Text { text },
        ContentPart::PngImage(png) => WirePart::ImageUrl {
            image_url: ImageUrl {
                url: format!(
                    "data:image/png;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(png)
                ),
            },
        },
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(1000 * 2u64.pow(attempt.min(5)))
}
