#![doc = "HTTP provider: implements the core LlmProvider contract against an OpenAI-compatible chat completions endpoint."]
//
//! # Provider Integration (CLI <-> Core)
//!
//! This module bridges the [`tutorgen_core::contract::LlmProvider`] trait to a
//! real model API. Any endpoint speaking the OpenAI chat completions dialect
//! works (OpenAI, LM Studio, Ollama, vLLM, ...).
//!
//! ## Client Usage
//!
//! - Construct [`HttpProviderConfig`] with [`HttpProviderConfig::from_env`]
//!   (`TUTORGEN_API_KEY` or `OPENAI_API_KEY`, `TUTORGEN_BASE_URL`,
//!   `TUTORGEN_MODEL`, `TUTORGEN_TIMEOUT_SECS`).
//! - The provider performs exactly one HTTP round-trip per call. Retries,
//!   caching and call collapsing belong to the core gateway.
//! - HTTP failures are mapped onto [`ProviderError`] by [`classify_status`].

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tutorgen_core::contract::LlmProvider;
use tutorgen_core::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for HttpProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProviderConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key_set", &self.api_key.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpProviderConfig {
    /// Read the provider settings from the environment.
    ///
    /// A missing key is allowed (local servers rarely need one), but an
    /// unparseable timeout is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = env::var("TUTORGEN_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        let base_url = env::var("TUTORGEN_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = env::var("TUTORGEN_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = match env::var("TUTORGEN_TIMEOUT_SECS") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| {
                tracing::error!(error = ?e, raw = %raw, "Failed to parse TUTORGEN_TIMEOUT_SECS from env");
                anyhow::anyhow!("TUTORGEN_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}")
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };

        let config = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
        };
        tracing::info!(
            base_url = %config.base_url,
            model = %config.model,
            api_key_set = config.api_key.is_some(),
            timeout_secs,
            "Initialized provider config from environment"
        );
        Ok(config)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct HttpProvider {
    config: HttpProviderConfig,
    client: Client,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy.
pub fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> ProviderError {
    let detail = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.trim())
    };
    match status {
        401 | 403 => ProviderError::Auth(detail),
        408 => ProviderError::Timeout,
        429 => ProviderError::RateLimited { retry_after },
        400 | 404 | 413 | 422 => ProviderError::MalformedRequest(detail),
        _ => ProviderError::Provider(detail),
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };
        tracing::debug!(model = %self.config.model, prompt_chars = prompt.len(), "Sending chat completion request");

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                tracing::error!(error = %e, "Chat completion request failed");
                ProviderError::Provider(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let hint = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status.as_u16(), &body, hint);
            tracing::error!(status = status.as_u16(), kind = err.kind(), "Provider returned an error status");
            return Err(err);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to decode chat completion response");
            ProviderError::Provider(format!("undecodable response: {e}"))
        })?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::Provider("empty completion".to_string()));
        }
        Ok(text)
    }
}
