//! Retrieval agent: owns the embedding index and the document registry.
//!
//! The index collaborator is mutated from this agent's mailbox loop only,
//! so chunk-batch upserts and context searches serialize in arrival order
//! and a search never observes a half-written batch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bus::{MessageBus, Subscriber};
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::types::{
    DocumentChunk, DocumentStatus, EmbeddingRecord, IndexStats, Message, Payload, RetrievedContext,
    ScoredChunk, Topic,
};

const NAME: &str = "retrieval";

struct DocRecord {
    chunk_ids: Vec<String>,
    status: DocumentStatus,
}

#[derive(Default)]
struct DocRegistry {
    docs: HashMap<String, DocRecord>,
    /// chunk_id -> chunk, for mapping search hits back to text.
    chunks: HashMap<String, DocumentChunk>,
}

/// Maintains the doc_id -> chunk mapping and services context requests.
pub struct RetrievalAgent {
    bus: Arc<MessageBus>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    registry: Mutex<DocRegistry>,
}

impl RetrievalAgent {
    pub fn new(bus: Arc<MessageBus>, index: Arc<dyn VectorIndex>, top_k: usize) -> Self {
        Self {
            bus,
            index,
            top_k,
            registry: Mutex::new(DocRegistry::default()),
        }
    }

    /// Embed every chunk first, then swap generations. A batch that fails
    /// embedding leaves the document's previous generation untouched.
    async fn process_batch(&self, doc_id: &str, chunks: Vec<DocumentChunk>) {
        let mut records = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            match self.embed_with_retry(&chunk.text).await {
                Ok(vector) => records.push(EmbeddingRecord {
                    chunk_id: chunk.chunk_id(),
                    vector,
                    doc_id: chunk.doc_id.clone(),
                    chunk_index: chunk.chunk_index,
                }),
                Err(error) => {
                    self.fail_document(doc_id, chunk.chunk_index, &error).await;
                    return;
                }
            }
        }
        self.publish_status(doc_id, DocumentStatus::Embedded).await;

        // Remove the prior generation before inserting the new one, so the
        // index never holds embeddings from two generations of a document.
        let prior: Vec<String> = {
            let registry = self.registry.lock().await;
            registry
                .docs
                .get(doc_id)
                .map(|record| record.chunk_ids.clone())
                .unwrap_or_default()
        };
        for chunk_id in &prior {
            if let Err(error) = self.index.remove(chunk_id).await {
                tracing::warn!(doc_id, chunk_id, %error, "Failed to remove prior vector");
            }
        }

        let chunk_ids: Vec<String> = records.iter().map(|r| r.chunk_id.clone()).collect();
        for record in records {
            let chunk_index = record.chunk_index;
            if let Err(error) = self.index.upsert(record).await {
                self.fail_document(doc_id, chunk_index, &error).await;
                return;
            }
        }
        self.publish_status(doc_id, DocumentStatus::Indexed).await;

        {
            let mut registry = self.registry.lock().await;
            for chunk_id in &prior {
                registry.chunks.remove(chunk_id);
            }
            for chunk in chunks {
                registry.chunks.insert(chunk.chunk_id(), chunk);
            }
            registry.docs.insert(
                doc_id.to_string(),
                DocRecord {
                    chunk_ids,
                    status: DocumentStatus::Ready,
                },
            );
        }
        self.publish_status(doc_id, DocumentStatus::Ready).await;
        tracing::info!(doc_id, "Document indexed");
    }

    async fn embed_with_retry(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        match self.index.embed(text).await {
            Ok(vector) => Ok(vector),
            Err(error) => {
                tracing::warn!(%error, "Embedding failed, retrying once");
                self.index.embed(text).await
            }
        }
    }

    /// Mark a document failed and report it, keeping whatever generation
    /// was indexed before.
    async fn fail_document(&self, doc_id: &str, chunk_index: usize, error: &IndexError) {
        tracing::error!(doc_id, chunk_index, %error, "Marking document failed");
        let reason = error.to_string();
        {
            let mut registry = self.registry.lock().await;
            match registry.docs.get_mut(doc_id) {
                Some(record) => {
                    record.status = DocumentStatus::Failed {
                        reason: reason.clone(),
                    }
                }
                None => {
                    registry.docs.insert(
                        doc_id.to_string(),
                        DocRecord {
                            chunk_ids: Vec::new(),
                            status: DocumentStatus::Failed {
                                reason: reason.clone(),
                            },
                        },
                    );
                }
            }
        }
        self.publish_status(doc_id, DocumentStatus::Failed { reason: reason.clone() })
            .await;
        self.bus
            .publish(
                NAME,
                Topic::Status,
                Payload::ErrorReport {
                    code: "embedding_failed".to_string(),
                    message: format!("{doc_id}: {reason}"),
                    recoverable: false,
                },
            )
            .await;
    }

    async fn process_context_request(&self, text: &str, correlation_id: Uuid) {
        let vector = match self.index.embed(text).await {
            Ok(vector) => vector,
            Err(error) => {
                tracing::error!(%error, "Query embedding failed");
                self.bus
                    .reply(
                        NAME,
                        correlation_id,
                        Payload::ErrorReport {
                            code: "retrieval_failed".to_string(),
                            message: error.to_string(),
                            recoverable: true,
                        },
                    )
                    .await;
                return;
            }
        };

        let hits = match self.index.search(&vector, self.top_k).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::error!(%error, "Index search failed");
                self.bus
                    .reply(
                        NAME,
                        correlation_id,
                        Payload::ErrorReport {
                            code: "retrieval_failed".to_string(),
                            message: error.to_string(),
                            recoverable: true,
                        },
                    )
                    .await;
                return;
            }
        };

        let context = {
            let registry = self.registry.lock().await;
            let scored = hits
                .into_iter()
                .filter_map(|hit| match registry.chunks.get(&hit.chunk_id) {
                    Some(chunk) => Some(ScoredChunk {
                        chunk: chunk.clone(),
                        score: hit.score,
                    }),
                    None => {
                        tracing::warn!(chunk_id = %hit.chunk_id, "Hit without registry entry");
                        None
                    }
                })
                .collect();
            RetrievedContext { hits: scored }
        };

        tracing::debug!(hits = context.len(), "Context assembled");
        self.bus
            .reply(NAME, correlation_id, Payload::ContextReply { context })
            .await;
    }

    async fn stats(&self) -> IndexStats {
        let registry = self.registry.lock().await;
        IndexStats {
            documents: registry
                .docs
                .values()
                .filter(|record| !record.chunk_ids.is_empty())
                .count(),
            chunks: self.index.count().await,
            dimensions: self.index.dimensions(),
        }
    }

    async fn clear(&self) -> usize {
        let chunk_ids: Vec<String> = {
            let mut registry = self.registry.lock().await;
            let ids = registry.chunks.keys().cloned().collect();
            registry.docs.clear();
            registry.chunks.clear();
            ids
        };
        for chunk_id in &chunk_ids {
            if let Err(error) = self.index.remove(chunk_id).await {
                tracing::warn!(chunk_id, %error, "Failed to remove vector during clear");
            }
        }
        tracing::info!(removed = chunk_ids.len(), "Index cleared");
        chunk_ids.len()
    }

    async fn publish_status(&self, doc_id: &str, status: DocumentStatus) {
        self.bus
            .publish(
                NAME,
                Topic::Status,
                Payload::StatusUpdate {
                    doc_id: doc_id.to_string(),
                    status,
                },
            )
            .await;
    }
}

#[async_trait]
impl Subscriber for RetrievalAgent {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, message: Message) {
        match message.payload {
            Payload::ChunkBatch { doc_id, chunks } => {
                self.process_batch(&doc_id, chunks).await;
            }
            Payload::ContextRequest { ref text } => match message.correlation_id {
                Some(corr) => self.process_context_request(text, corr).await,
                None => {
                    tracing::error!("Context request without correlation ID, cannot reply");
                }
            },
            Payload::StatsRequest => {
                if let Some(corr) = message.correlation_id {
                    let stats = self.stats().await;
                    self.bus
                        .reply(NAME, corr, Payload::StatsReply(stats))
                        .await;
                }
            }
            Payload::ClearRequest => {
                let removed = self.clear().await;
                if let Some(corr) = message.correlation_id {
                    self.bus
                        .reply(
                            NAME,
                            corr,
                            Payload::Cleared {
                                chunks_removed: removed,
                            },
                        )
                        .await;
                }
            }
            other => {
                tracing::error!(
                    topic = %message.topic,
                    payload = other.name(),
                    "Unexpected payload for retrieval agent"
                );
            }
        }
    }
}
