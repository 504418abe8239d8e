//! Error types for the Docent core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the bus, parsing, indexing, generation, and configuration
//! domains. Only `ConfigError::NoAgents` is fatal; every other condition
//! degrades into a reported error or a fallback answer.

use serde::{Deserialize, Serialize};

use crate::types::Topic;

/// Top-level error type for the Docent core library.
#[derive(Debug, thiserror::Error)]
pub enum DocentError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the message bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("No subscriber registered for topic '{topic}'")]
    UnknownTopic { topic: Topic },

    #[error("Reply channel closed before a reply arrived")]
    Closed,

    #[error("Unexpected reply payload '{payload}'")]
    UnexpectedReply { payload: String },
}

/// Errors from the document parser collaborator.
///
/// Carried inside `Payload::Rejected`, so this one is serializable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseError {
    #[error("Unsupported document format: '{extension}'")]
    UnsupportedFormat { extension: String },

    #[error("Document decode error: {message}")]
    Decode { message: String },
}

/// Errors from the vector index collaborator.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Embedding failed: {message}")]
    Embedding { message: String },

    #[error("Index store error: {message}")]
    Store { message: String },
}

/// Errors from the generation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Provider response parse error: {message}")]
    ResponseParse { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No agents registered on the message bus at startup")]
    NoAgents,

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `DocentError`.
pub type Result<T> = std::result::Result<T, DocentError>;
