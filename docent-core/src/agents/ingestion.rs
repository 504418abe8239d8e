//! Ingestion agent: documents in, chunk batches out.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::bus::{MessageBus, Subscriber};
use crate::chunk::chunk_blocks;
use crate::config::ChunkingConfig;
use crate::parser::DocumentParser;
use crate::types::{DocumentStatus, Message, Payload, Topic};

const NAME: &str = "ingestion";

/// Consumes submitted documents, delegates decoding to the parser
/// collaborator, chunks the result, and publishes one chunk batch per
/// document. A rejected document is reported back to the submitter and
/// never retried.
pub struct IngestionAgent {
    bus: Arc<MessageBus>,
    parser: Arc<dyn DocumentParser>,
    chunking: ChunkingConfig,
}

impl IngestionAgent {
    pub fn new(
        bus: Arc<MessageBus>,
        parser: Arc<dyn DocumentParser>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            bus,
            parser,
            chunking,
        }
    }

    async fn process_document(
        &self,
        doc_id: &str,
        bytes: &[u8],
        filename: &str,
        correlation_id: Option<Uuid>,
    ) {
        self.publish_status(doc_id, DocumentStatus::Uploaded).await;

        let blocks = match self.parser.parse(bytes, filename).await {
            Ok(blocks) => blocks,
            Err(error) => {
                tracing::warn!(doc_id, filename, %error, "Document rejected by parser");
                self.publish_status(
                    doc_id,
                    DocumentStatus::Failed {
                        reason: error.to_string(),
                    },
                )
                .await;
                if let Some(corr) = correlation_id {
                    self.bus
                        .reply(
                            NAME,
                            corr,
                            Payload::Rejected {
                                doc_id: doc_id.to_string(),
                                error,
                            },
                        )
                        .await;
                }
                return;
            }
        };

        let chunks = chunk_blocks(doc_id, &blocks, self.chunking.window, self.chunking.overlap);
        let count = chunks.len();
        tracing::info!(doc_id, chunks = count, "Document chunked");

        // Status before handoff keeps the lifecycle sequence deterministic
        // for Status observers.
        self.publish_status(doc_id, DocumentStatus::Chunked).await;
        self.bus
            .publish(
                NAME,
                Topic::Chunks,
                Payload::ChunkBatch {
                    doc_id: doc_id.to_string(),
                    chunks,
                },
            )
            .await;

        if let Some(corr) = correlation_id {
            self.bus
                .reply(
                    NAME,
                    corr,
                    Payload::Ack {
                        doc_id: doc_id.to_string(),
                        chunks: count,
                    },
                )
                .await;
        }
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
impl Subscriber for IngestionAgent {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, message: Message) {
        match message.payload {
            Payload::Document {
                ref doc_id,
                ref bytes,
                ref filename,
            } => {
                self.process_document(doc_id, bytes, filename, message.correlation_id)
                    .await;
            }
            other => {
                tracing::error!(
                    topic = %message.topic,
                    payload = other.name(),
                    "Unexpected payload for ingestion agent"
                );
            }
        }
    }
}
