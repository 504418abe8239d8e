//! Shared message and data model types for the Docent pipeline.
//!
//! Every payload that crosses the bus is a tagged variant of [`Payload`];
//! handlers match exhaustively and treat an unexpected variant on their
//! topic as an error rather than ignoring it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::ParseError;

/// Bus topics. A closed set: every message belongs to exactly one topic,
/// and each agent subscribes to the topics it services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Submitted documents, consumed by the ingestion agent.
    Document,
    /// Chunk batches produced by ingestion, consumed by retrieval.
    Chunks,
    /// Context and index-admin requests serviced by the retrieval agent.
    Context,
    /// User questions, consumed by the response agent.
    Query,
    /// Finished answers, for front ends that listen instead of requesting.
    Answer,
    /// Document lifecycle updates and failure reports.
    Status,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Document => "document",
            Topic::Chunks => "chunks",
            Topic::Context => "context",
            Topic::Query => "query",
            Topic::Answer => "answer",
            Topic::Status => "status",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message on the bus: routing envelope plus typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID.
    pub id: Uuid,
    /// Topic the message was published on.
    pub topic: Topic,
    /// Name of the publishing agent (or front end).
    pub sender: String,
    /// The payload.
    pub payload: Payload,
    /// Correlation ID linking a request to its single accepted reply.
    pub correlation_id: Option<Uuid>,
    /// Timestamp of creation.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(topic: Topic, sender: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic,
            sender: sender.into(),
            payload,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Set a correlation ID for request/reply pairing.
    pub fn with_correlation(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

/// Payload types for pipeline communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// A raw document submitted for ingestion.
    Document {
        doc_id: String,
        bytes: Vec<u8>,
        filename: String,
    },
    /// All chunks of one document, in source order.
    ChunkBatch {
        doc_id: String,
        chunks: Vec<DocumentChunk>,
    },
    /// Request for retrieval context for a query text.
    ContextRequest { text: String },
    /// Reply carrying ranked context.
    ContextReply { context: RetrievedContext },
    /// A user question.
    Query { text: String },
    /// A finished answer.
    Answer(Answer),
    /// Acknowledgement that a document was accepted and chunked.
    Ack { doc_id: String, chunks: usize },
    /// A document the parser refused, reported back to the submitter.
    Rejected { doc_id: String, error: ParseError },
    /// Request for index statistics.
    StatsRequest,
    /// Reply carrying index statistics.
    StatsReply(IndexStats),
    /// Request to drop every indexed document.
    ClearRequest,
    /// Reply confirming a clear.
    Cleared { chunks_removed: usize },
    /// Document lifecycle transition.
    StatusUpdate {
        doc_id: String,
        status: DocumentStatus,
    },
    /// Failure report published for observers.
    ErrorReport {
        code: String,
        message: String,
        recoverable: bool,
    },
}

impl Payload {
    /// Variant name, for logging unexpected payloads without dumping bodies.
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Document { .. } => "document",
            Payload::ChunkBatch { .. } => "chunk_batch",
            Payload::ContextRequest { .. } => "context_request",
            Payload::ContextReply { .. } => "context_reply",
            Payload::Query { .. } => "query",
            Payload::Answer(_) => "answer",
            Payload::Ack { .. } => "ack",
            Payload::Rejected { .. } => "rejected",
            Payload::StatsRequest => "stats_request",
            Payload::StatsReply(_) => "stats_reply",
            Payload::ClearRequest => "clear_request",
            Payload::Cleared { .. } => "cleared",
            Payload::StatusUpdate { .. } => "status_update",
            Payload::ErrorReport { .. } => "error_report",
        }
    }
}

/// Where a chunk's text came from within its source document.
///
/// The reference parser only produces `Paragraph` and `Row`, but the seam
/// carries the full location vocabulary of the supported source formats so
/// richer parsers slot in without a type change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkLocation {
    Paragraph { ordinal: usize },
    Page { number: usize },
    Slide { number: usize },
    Row { line: usize },
}

impl fmt::Display for ChunkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkLocation::Paragraph { ordinal } => write!(f, "paragraph {ordinal}"),
            ChunkLocation::Page { number } => write!(f, "page {number}"),
            ChunkLocation::Slide { number } => write!(f, "slide {number}"),
            ChunkLocation::Row { line } => write!(f, "row {line}"),
        }
    }
}

/// A contiguous slice of a document's text, the unit of retrieval.
///
/// `chunk_index` is zero-based and contiguous within a document;
/// re-ingesting a `doc_id` replaces its entire chunk set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub doc_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub location: ChunkLocation,
}

impl DocumentChunk {
    /// Stable chunk ID used as the index key.
    pub fn chunk_id(&self) -> String {
        format!("{}-chunk-{}", self.doc_id, self.chunk_index)
    }
}

/// One embedding per chunk, created when the retrieval agent processes a
/// chunk batch and destroyed when the document is replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub doc_id: String,
    pub chunk_index: usize,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Ranked retrieval results, descending by score, at most K entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// The generation collaborator wrote the answer text.
    Generative,
    /// The answer quotes retrieved passages directly.
    Fallback,
}

/// Reference to the chunk an answer drew on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub doc_id: String,
    pub chunk_index: usize,
    pub score: f32,
}

/// A finished answer with source attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub mode: AnswerMode,
}

/// Document lifecycle. Progresses `Uploaded → Chunked → Embedded → Indexed
/// → Ready`, or drops to `Failed` from any step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Chunked,
    Embedded,
    Indexed,
    Ready,
    Failed { reason: String },
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Uploaded => f.write_str("uploaded"),
            DocumentStatus::Chunked => f.write_str("chunked"),
            DocumentStatus::Embedded => f.write_str("embedded"),
            DocumentStatus::Indexed => f.write_str("indexed"),
            DocumentStatus::Ready => f.write_str("ready"),
            DocumentStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Point-in-time index statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Documents with at least one indexed chunk.
    pub documents: usize,
    /// Total indexed chunks.
    pub chunks: usize,
    /// Embedding dimensionality.
    pub dimensions: usize,
}

/// Acknowledgement returned to a front end after document submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub doc_id: String,
    pub chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder_sets_correlation() {
        let corr = Uuid::new_v4();
        let message = Message::new(
            Topic::Query,
            "frontend",
            Payload::Query {
                text: "what is docent?".into(),
            },
        )
        .with_correlation(corr);
        assert_eq!(message.correlation_id, Some(corr));
        assert_eq!(message.topic, Topic::Query);
        assert_eq!(message.sender, "frontend");
    }

    #[test]
    fn test_chunk_id_format() {
        let chunk = DocumentChunk {
            doc_id: "notes.txt".into(),
            chunk_index: 3,
            text: "hello".into(),
            location: ChunkLocation::Paragraph { ordinal: 4 },
        };
        assert_eq!(chunk.chunk_id(), "notes.txt-chunk-3");
    }

    #[test]
    fn test_location_display() {
        assert_eq!(
            ChunkLocation::Paragraph { ordinal: 2 }.to_string(),
            "paragraph 2"
        );
        assert_eq!(ChunkLocation::Page { number: 7 }.to_string(), "page 7");
        assert_eq!(ChunkLocation::Slide { number: 1 }.to_string(), "slide 1");
        assert_eq!(ChunkLocation::Row { line: 11 }.to_string(), "row 11");
    }

    #[test]
    fn test_payload_serde_roundtrip() {
        let payload = Payload::Ack {
            doc_id: "a.txt".into(),
            chunks: 5,
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        match back {
            Payload::Ack { doc_id, chunks } => {
                assert_eq!(doc_id, "a.txt");
                assert_eq!(chunks, 5);
            }
            other => panic!("Expected Ack, got {}", other.name()),
        }
    }

    #[test]
    fn test_status_serde_tags_state() {
        let json = serde_json::to_string(&DocumentStatus::Failed {
            reason: "boom".into(),
        })
        .unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        assert!(json.contains("boom"));
    }
}
