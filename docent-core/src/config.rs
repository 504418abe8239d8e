//! Configuration for the Docent pipeline.
//!
//! Uses `figment` for layered configuration: struct defaults -> `docent.toml`
//! -> `DOCENT_`-prefixed environment variables. Every knob the core consumes
//! lives here; agents receive their slice at construction and never re-read
//! the environment.

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocentConfig {
    /// Chunking policy.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval and index settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Bus timing.
    #[serde(default)]
    pub bus: BusConfig,
    /// Generation collaborator settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl DocentConfig {
    /// Load layered configuration. An explicit `path` replaces the default
    /// `docent.toml` lookup in the working directory; a missing file is not
    /// an error, the defaults simply apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(DocentConfig::default()));
        figment = match path {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment.merge(Toml::file("docent.toml")),
        };
        figment = figment.merge(Env::prefixed("DOCENT_").split("__"));
        figment
            .extract()
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })
    }
}

/// Chunk window policy: fixed-size windows with overlap, snapping to
/// paragraph or sentence boundaries that fall inside the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Overlap carried between consecutive windows, in characters.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            overlap: default_overlap(),
        }
    }
}

fn default_window() -> usize {
    1000
}

fn default_overlap() -> usize {
    100
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks returned per context request.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Embedding dimensionality of the reference index.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            dimensions: default_dimensions(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

fn default_dimensions() -> usize {
    256
}

/// Bus timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Timeout for internal requests (context retrieval, ingestion ack).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Timeout for a full query round trip, including generation.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl BusConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_query_timeout_ms() -> u64 {
    90_000
}

/// Generation collaborator settings. Whether credentials resolve decides the
/// answer mode once, at pipeline construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Explicit API key; takes precedence over `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable to read the API key from.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Override for the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl GenerationConfig {
    /// Resolve credentials: explicit key first, then the configured
    /// environment variable. Empty strings count as absent.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|key| !key.is_empty()))
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: None,
        }
    }
}

fn default_api_key_env() -> String {
    "GOOGLE_API_KEY".to_string()
}

fn default_model() -> String {
    crate::generation::DEFAULT_MODEL.to_string()
}
