//! # Docent Core
//!
//! Core library for the Docent document question-answering pipeline.
//! Provides the in-process message bus, the ingestion/retrieval/response
//! agents, the collaborator seams (document parser, vector index,
//! generator) with reference implementations, configuration, and
//! fundamental types.
//!
//! The usual entry point is [`pipeline::Pipeline`], which wires everything
//! together and exposes `submit_document` / `submit_query`.

pub mod agents;
pub mod bus;
pub mod chunk;
pub mod config;
pub mod error;
pub mod generation;
pub mod index;
pub mod parser;
pub mod pipeline;
pub mod types;

// Re-export commonly used types at the crate root.
pub use agents::{IngestionAgent, ResponseAgent, RetrievalAgent};
pub use bus::{MessageBus, Subscriber};
pub use config::{BusConfig, ChunkingConfig, DocentConfig, GenerationConfig, RetrievalConfig};
pub use error::{
    BusError, ConfigError, DocentError, GenerationError, IndexError, ParseError, Result,
};
pub use generation::{GeminiGenerator, Generator};
pub use index::{InMemoryIndex, SearchHit, VectorIndex};
pub use parser::{DocumentParser, PlainTextParser, TextBlock};
pub use pipeline::Pipeline;
pub use types::{
    Answer, AnswerMode, ChunkLocation, DocumentChunk, DocumentStatus, EmbeddingRecord, IndexStats,
    IngestReceipt, Message, Payload, RetrievedContext, ScoredChunk, SourceRef, Topic,
};
