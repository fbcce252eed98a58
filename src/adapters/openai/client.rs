//! Chat completions client in JSON mode.
//!
//! Every request waits on a `governor` rate limiter, carries a per-request
//! timeout, and is retried with exponential backoff on 429, 5xx, timeouts
//! and network errors, up to `max_retries` retries.

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::errors::OpenAiError;
use crate::domain::models::OpenAiConfig;

/// Environment variable read when no key is configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One message of a chat completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// `system` or `user`
    pub role: &'static str,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// System message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    /// User message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Rate-limited, retrying chat completions client shared by the adapters.
pub struct OpenAiClient {
    http: ReqwestClient,
    limiter: DirectRateLimiter,
    endpoint: String,
    model: String,
    api_key: String,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl OpenAiClient {
    /// Build a client. The API key falls back to `OPENAI_API_KEY`.
    pub fn new(config: &OpenAiConfig) -> Result<Self, OpenAiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty()))
            .ok_or(OpenAiError::MissingApiKey)?;

        if !(config.requests_per_second > 0.0 && config.requests_per_second.is_finite()) {
            return Err(OpenAiError::InvalidConfig(
                "requests_per_second must be positive".to_string(),
            ));
        }
        let burst = NonZeroU32::new(config.burst_size)
            .ok_or_else(|| OpenAiError::InvalidConfig("burst_size must be positive".to_string()))?;
        let period = Duration::try_from_secs_f64(1.0 / config.requests_per_second).map_err(|e| {
            OpenAiError::InvalidConfig(format!(
                "requests_per_second {} is too small: {e}",
                config.requests_per_second
            ))
        })?;
        let quota = Quota::with_period(period)
            .ok_or_else(|| OpenAiError::InvalidConfig("requests_per_second is too large".to_string()))?
            .allow_burst(burst);

        let http = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            limiter: RateLimiter::direct(quota),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        })
    }

    /// Send `messages` and parse the reply content as a JSON object.
    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    pub async fn complete_json(&self, messages: &[ChatMessage]) -> Result<Value, OpenAiError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build();

        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let content = retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            match self.send_once(messages).await {
                Ok(content) => Ok(content),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(attempt = attempt + 1, error = %e, "Chat completion failed, retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        let value: Value =
            serde_json::from_str(&content).map_err(|e| OpenAiError::Unparseable(format!("{e}: {content}")))?;
        if !value.is_object() {
            return Err(OpenAiError::Unparseable(format!("expected a JSON object: {content}")));
        }
        Ok(value)
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String, OpenAiError> {
        self.limiter.until_ready().await;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OpenAiError::from_status(status, body));
        }
        debug!(status = %status, bytes = body.len(), "Chat completion received");

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| OpenAiError::Unparseable(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OpenAiError::EmptyResponse)
    }
}
