//! Gemini-style generateContent backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use tessera_core::{defaults, Error, LlmBackend, LlmResponse, LlmUsage, Result};

/// Configuration for the Gemini backend.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `GEMINI_BASE_URL` | generativelanguage endpoint | API base URL |
/// | `GEMINI_API_KEY` | none | API key (optional for proxies) |
/// | `GEMINI_MODEL` | `gemini-2.0-flash` | Generation model |
/// | `GEMINI_TIMEOUT_SECS` | `120` | Per-attempt request timeout |
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API base URL.
    pub base_url: String,
    /// API key sent as `x-goog-api-key` (optional for local proxies).
    pub api_key: Option<String>,
    /// Generation model name.
    pub model: String,
    /// Generation temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_output_tokens: u32,
    /// Per-attempt request timeout in seconds. Aborts the in-flight call.
    pub timeout_secs: u64,
    /// Maximum retries on transient failures; total requests is this plus one.
    pub max_retries: u32,
    /// Exponential backoff base delay in milliseconds.
    pub backoff_base_ms: u64,
    /// Exponential backoff delay cap in milliseconds.
    pub backoff_cap_ms: u64,
    /// Prompt token rate, USD per million tokens.
    pub prompt_rate_per_million: f64,
    /// Completion token rate, USD per million tokens.
    pub completion_rate_per_million: f64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::LLM_BASE_URL.to_string(),
            api_key: None,
            model: defaults::LLM_MODEL.to_string(),
            temperature: defaults::LLM_TEMPERATURE,
            max_output_tokens: defaults::LLM_MAX_OUTPUT_TOKENS,
            timeout_secs: defaults::LLM_TIMEOUT_SECS,
            max_retries: defaults::LLM_MAX_RETRIES,
            backoff_base_ms: defaults::LLM_BACKOFF_BASE_MS,
            backoff_cap_ms: defaults::LLM_BACKOFF_CAP_MS,
            prompt_rate_per_million: defaults::LLM_PROMPT_RATE_PER_MILLION,
            completion_rate_per_million: defaults::LLM_COMPLETION_RATE_PER_MILLION,
        }
    }
}

impl GeminiConfig {
    /// Create config from environment variables (with defaults).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            config.base_url = url;
        }
        config.api_key = std::env::var("GEMINI_API_KEY").ok();
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(secs) = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout_secs = secs;
        }
        config
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the maximum retry count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the backoff base and cap in milliseconds. Tests shrink these.
    pub fn with_backoff_ms(mut self, base_ms: u64, cap_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_cap_ms = cap_ms;
        self
    }

    /// Set the per-attempt timeout in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// ─── Wire types ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: ContentBlock,
    contents: Vec<ContentBlock>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    /// Reasoning parts flagged by the model; excluded from the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ContentBlock>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

// ─── Backend ───────────────────────────────────────────────────────────────

/// One attempt's outcome, classified for the retry loop.
enum AttemptError {
    /// 429, 5xx, network failure, or timeout. Worth retrying.
    Transient(Error),
    /// Everything else. Surfaces immediately.
    Fatal(Error),
}

/// Gemini generateContent backend with retry and usage accounting.
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "Initializing Gemini backend: url={}, model={}",
            config.base_url, config.model
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_request(&self, system_prompt: &str, user_prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: ContentBlock {
                role: None,
                parts: vec![Part {
                    text: Some(system_prompt.to_string()),
                    thought: None,
                }],
            },
            contents: vec![ContentBlock {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(user_prompt.to_string()),
                    thought: None,
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }

    async fn attempt(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> std::result::Result<LlmResponse, AttemptError> {
        let mut builder = self.client.post(url).json(request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.header("x-goog-api-key", key);
        }

        let response = builder.send().await.map_err(|e| {
            AttemptError::Transient(Error::Llm(format!("request failed: {}", e)))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_transient_status(status) {
                return Err(AttemptError::Transient(Error::Llm(format!(
                    "HTTP {}: {}",
                    status,
                    truncate(&body, 200)
                ))));
            }
            return Err(AttemptError::Fatal(Error::LlmRejected {
                status: status.as_u16(),
                body: truncate(&body, 500).to_string(),
            }));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(Error::Llm(format!("unparseable response: {}", e))))?;

        self.assemble(parsed).map_err(AttemptError::Fatal)
    }

    /// Concatenate text from all non-thought parts of the first candidate and
    /// attach usage accounting.
    fn assemble(&self, response: GenerateContentResponse) -> Result<LlmResponse> {
        let content = response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| p.thought != Some(true))
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default();

        if content.is_empty() {
            return Err(Error::Llm("empty response from model".to_string()));
        }

        let meta = response.usage_metadata.unwrap_or_default();
        let usage = LlmUsage {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
            total_tokens: meta.total_token_count,
            cost: self.cost(meta.prompt_token_count, meta.candidates_token_count),
        };

        Ok(LlmResponse { content, usage })
    }

    /// Informational cost in USD from per-million-token rates.
    fn cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        f64::from(prompt_tokens) / 1_000_000.0 * self.config.prompt_rate_per_million
            + f64::from(completion_tokens) / 1_000_000.0 * self.config.completion_rate_per_million
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmResponse> {
        let url = self.endpoint();
        let request = self.build_request(system_prompt, user_prompt);

        let mut attempt = 0u32;
        loop {
            match self.attempt(&url, &request).await {
                Ok(response) => {
                    debug!(
                        prompt_tokens = response.usage.prompt_tokens,
                        completion_tokens = response.usage.completion_tokens,
                        "Generation succeeded"
                    );
                    return Ok(response);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) => {
                    if attempt >= self.config.max_retries {
                        warn!(attempt, error = %e, "Retries exhausted");
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        attempt,
                        self.config.backoff_base_ms,
                        self.config.backoff_cap_ms,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient LLM failure, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// True for HTTP statuses worth retrying: 429 and all 5xx.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `min(base · 2^attempt, cap)` as a Duration.
fn backoff_delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
