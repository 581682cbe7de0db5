//! Generative model client.
//!
//! [`GeminiClient`] sends one `generateContent` request per attempt and
//! retries any failure (non-2xx status, transport error, unreadable body,
//! empty candidates) after `base_delay × attempt`, up to `max_attempts`.
//! When every attempt fails the last failure is returned as
//! [`GatewayError::Api`] with the HTTP status of the last response, if any.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{GatewayError, Result};

/// Maximum number of response-body bytes quoted in an error message.
const MAX_ERROR_BODY_LEN: usize = 300;

/// A text-in, text-out generative model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Identifier of the underlying model.
    fn id(&self) -> &str;

    /// Generates text for `prompt`, passing `temperature` through.
    async fn invoke(&self, prompt: &str, temperature: f32) -> Result<String>;
}

// ============================================================================
// Configuration
// ============================================================================

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

const fn default_top_k() -> u32 {
    40
}

const fn default_top_p() -> f32 {
    0.95
}

const fn default_max_output_tokens() -> u32 {
    8192
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_timeout_secs() -> u64 {
    120
}

/// Settings for [`GeminiClient`].
///
/// `top_k`, `top_p` and `max_output_tokens` are fixed for the lifetime of a
/// client; only the temperature varies per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Usually supplied through `GEMINI_API_KEY`.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// API root, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Top-k sampling.
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Nucleus sampling.
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Output token ceiling.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Attempts per invocation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff; attempt `n` waits `n × base_delay_ms` before retrying.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GeminiConfig {
    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, max_attempts: u32, base_delay_ms: u64) -> Self {
        self.max_attempts = max_attempts;
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Returns `true` if an API key is present.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, if it has any.
    fn first_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
    api_key: String,
}

impl GeminiClient {
    /// Creates a client. Fails when no API key is configured.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(GatewayError::NotConfigured {
                service: "generative model",
                hint: "set GEMINI_API_KEY or gemini.apiKey in coursegen.json",
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Returns the client's settings.
    #[must_use]
    pub const fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Backoff before the attempt following `attempt`.
    fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.config.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    async fn attempt(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = GenerateRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature,
                top_k: self.config.top_k,
                top_p: self.config.top_p,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::api(format!("request failed: {e}"), e.status().map(|s| s.as_u16())))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::api(
                format!(
                    "generative endpoint returned {status}: {}",
                    truncate(&text, MAX_ERROR_BODY_LEN)
                ),
                Some(status.as_u16()),
            ));
        }

        let reply: GenerateResponse = response.json().await.map_err(|e| {
            GatewayError::api(
                format!("unreadable response body: {e}"),
                Some(status.as_u16()),
            )
        })?;

        reply.first_text().ok_or_else(|| {
            GatewayError::api("response contained no candidate text", Some(status.as_u16()))
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn id(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, prompt), fields(model = %self.config.model, prompt_len = prompt.len()))]
    async fn invoke(&self, prompt: &str, temperature: f32) -> Result<String> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.attempt(prompt, temperature).await {
                Ok(text) => {
                    debug!(attempt, response_len = text.len(), "generation succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts,
                        transient = e.is_transient(),
                        error = %e,
                        "generation attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::api("no attempt was made", None)))
    }
}

/// Truncates `text` to at most `max` bytes on a character boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
