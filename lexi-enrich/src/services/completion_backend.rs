//! Inference backend client
//!
//! The pipeline talks to the model through [`CompletionBackend`] so the
//! worker can be driven by a scripted backend in tests. The production
//! implementation speaks the OpenAI-compatible chat-completions protocol.

use crate::error::{EnrichError, EnrichResult};
use async_trait::async_trait;
use lexi_common::config::{is_valid_key, BackendConfig};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest backend error body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 500;

/// One prompt sent to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

/// Text-completion backend
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Fail fast on missing or placeholder credentials before any network activity
    fn check_configuration(&self) -> EnrichResult<()>;

    /// Perform exactly one request; retries are the caller's concern
    async fn complete(&self, request: CompletionRequest) -> EnrichResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
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

/// OpenAI-compatible chat-completions client
pub struct HttpCompletionBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
    temperature: f32,
    rate_limiter: Option<
        governor::RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl HttpCompletionBackend {
    /// Build a client from backend settings
    ///
    /// `api_key` is the already-resolved credential (env or TOML); it is not
    /// validated here so that a misconfiguration surfaces on the task.
    pub fn new(config: &BackendConfig, api_key: Option<String>) -> EnrichResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| EnrichError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let rate_limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| governor::RateLimiter::direct(governor::Quota::per_minute(rpm)));

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            rate_limiter,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn credentials(&self) -> EnrichResult<(&str, &str)> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| is_valid_key(k))
            .ok_or_else(|| EnrichError::Config("backend API key is missing or a placeholder".to_string()))?;
        let model = self
            .model
            .as_deref()
            .filter(|m| is_valid_key(m))
            .ok_or_else(|| EnrichError::Config("backend model identifier is missing".to_string()))?;
        Ok((api_key, model))
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        truncated.push('…');
        truncated
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    fn name(&self) -> &str {
        "chat-completions"
    }

    fn check_configuration(&self) -> EnrichResult<()> {
        self.credentials().map(|_| ())
    }

    async fn complete(&self, request: CompletionRequest) -> EnrichResult<String> {
        let (api_key, model) = self.credentials()?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let body = ChatRequest {
            model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };

        let started = Instant::now();
        debug!(endpoint = %self.endpoint, model, prompt_chars = request.user.len(), "Sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_chars = text.len(),
            "Completion response received"
        );

        if !status.is_success() {
            return Err(EnrichError::from_status(status.as_u16(), truncate_body(&text)));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| EnrichError::MalformedResponse(format!("completion envelope: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EnrichError::MalformedResponse("completion has no message content".to_string()))
    }
}
