//! Generation collaborator seam and the Google Gemini implementation.
//!
//! The pipeline never depends on a generator being present: the response
//! agent decides its answer mode once from whether credentials resolved,
//! and any generator failure degrades to a fallback answer.
//!
//! Gemini API notes:
//! - Auth via `?key=API_KEY` query parameter (not header-based)
//! - Request body is a `contents` list of role/parts turns
//! - Reply text sits in `candidates[0].content.parts[*].text`

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// The default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// The default Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Retry-after hint used when a rate-limit response carries none.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Natural-language generation collaborator.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce answer text for an assembled prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Model identifier, for logging and answer metadata.
    fn model_name(&self) -> &str;
}

/// Google Gemini generator.
#[derive(Debug)]
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    /// Create a generator from configuration.
    ///
    /// Returns `GenerationError::AuthFailed` when no API key resolves from
    /// the explicit config value or the configured environment variable.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| GenerationError::AuthFailed {
                provider: format!("Gemini (env var '{}' not set)", config.api_key_env),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Connection {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    fn build_request_body(prompt: &str) -> Value {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
        })
    }

    /// Concatenate the text parts of the first candidate.
    fn extract_text(body: &Value) -> Result<String, GenerationError> {
        let parts = body["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "Response has no candidates".to_string(),
            })?;

        let text: String = parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect();

        if text.is_empty() {
            return Err(GenerationError::ResponseParse {
                message: "Candidate contains no text parts".to_string(),
            });
        }
        Ok(text)
    }

    fn error_for_status(status: u16, body: &str) -> GenerationError {
        match status {
            401 | 403 => GenerationError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => GenerationError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            },
            _ => GenerationError::Connection {
                message: format!(
                    "HTTP {status}: {}",
                    body.chars().take(200).collect::<String>()
                ),
            },
        }
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = Self::build_request_body(prompt);

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Calling Gemini");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error_for_status(status.as_u16(), &body));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::ResponseParse {
                message: e.to_string(),
            })?;
        Self::extract_text(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
