//! Pipeline facade: wires the bus and agents and exposes the front-end
//! contract.
//!
//! Front ends (the CLI, tests, an embedding application) call
//! [`Pipeline::submit_document`] and [`Pipeline::submit_query`]; everything
//! behind those two calls happens over the bus. The bus instance is built
//! here and handed to each agent by `Arc`; there is no global registry.

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{IngestionAgent, ResponseAgent, RetrievalAgent};
use crate::bus::MessageBus;
use crate::config::DocentConfig;
use crate::error::{BusError, ConfigError, DocentError, Result};
use crate::generation::{GeminiGenerator, Generator};
use crate::index::{InMemoryIndex, VectorIndex};
use crate::parser::{DocumentParser, PlainTextParser};
use crate::types::{Answer, IndexStats, IngestReceipt, Payload, Topic};

const NAME: &str = "frontend";

/// The assembled document Q&A pipeline.
pub struct Pipeline {
    bus: Arc<MessageBus>,
    request_timeout: Duration,
    query_timeout: Duration,
}

impl Pipeline {
    /// Wire the bus and the three agents from explicit collaborators.
    ///
    /// Passing `None` for the generator fixes the pipeline in fallback
    /// mode. Fails with [`ConfigError::NoAgents`] if the bus ends up with
    /// no subscribers, the one fatal startup condition.
    pub async fn new(
        config: &DocentConfig,
        parser: Arc<dyn DocumentParser>,
        index: Arc<dyn VectorIndex>,
        generator: Option<Arc<dyn Generator>>,
    ) -> Result<Self> {
        let bus = Arc::new(MessageBus::new());

        let ingestion = Arc::new(IngestionAgent::new(
            bus.clone(),
            parser,
            config.chunking.clone(),
        ));
        let retrieval = Arc::new(RetrievalAgent::new(
            bus.clone(),
            index,
            config.retrieval.top_k,
        ));
        let response = Arc::new(ResponseAgent::new(
            bus.clone(),
            generator,
            config.bus.request_timeout(),
        ));

        bus.subscribe(Topic::Document, ingestion).await;
        bus.subscribe(Topic::Chunks, retrieval.clone()).await;
        bus.subscribe(Topic::Context, retrieval).await;
        bus.subscribe(Topic::Query, response).await;

        ensure_agents(&bus).await?;
        tracing::info!(
            subscribers = bus.subscriber_count().await,
            "Pipeline assembled"
        );

        Ok(Self {
            bus,
            request_timeout: config.bus.request_timeout(),
            query_timeout: config.bus.query_timeout(),
        })
    }

    /// Assemble the reference pipeline: plain-text parser, in-memory index,
    /// and a Gemini generator when credentials resolve. The answer mode is
    /// decided here, once, from the credential lookup.
    pub async fn with_defaults(config: &DocentConfig) -> Result<Self> {
        let parser: Arc<dyn DocumentParser> = Arc::new(PlainTextParser::new());
        let index: Arc<dyn VectorIndex> =
            Arc::new(InMemoryIndex::new(config.retrieval.dimensions));
        let generator: Option<Arc<dyn Generator>> = match config.generation.resolve_api_key() {
            Some(_) => match GeminiGenerator::new(&config.generation) {
                Ok(generator) => {
                    tracing::info!(model = %config.generation.model, "Generation credentials found");
                    Some(Arc::new(generator))
                }
                Err(error) => {
                    tracing::warn!(%error, "Generator unavailable, answering from retrieved text only");
                    None
                }
            },
            None => {
                tracing::info!("No generation credentials, answering from retrieved text only");
                None
            }
        };
        Self::new(config, parser, index, generator).await
    }

    /// The bus, for front ends that subscribe to the Answer or Status
    /// topics instead of (or in addition to) requesting.
    pub fn bus(&self) -> Arc<MessageBus> {
        self.bus.clone()
    }

    /// Submit a document for ingestion. The returned receipt means the
    /// document was accepted and chunked; embedding and indexing complete
    /// asynchronously behind it, in order, before any later query is served.
    ///
    /// The filename doubles as the document ID, so submitting the same
    /// filename again replaces the earlier version.
    pub async fn submit_document(&self, bytes: Vec<u8>, filename: &str) -> Result<IngestReceipt> {
        let reply = self
            .bus
            .request(
                NAME,
                Topic::Document,
                Payload::Document {
                    doc_id: filename.to_string(),
                    bytes,
                    filename: filename.to_string(),
                },
                self.request_timeout,
            )
            .await?;

        match reply {
            Payload::Ack { doc_id, chunks } => Ok(IngestReceipt { doc_id, chunks }),
            Payload::Rejected { error, .. } => Err(DocentError::Parse(error)),
            other => Err(unexpected(other)),
        }
    }

    /// Ask a question. A live pipeline always produces an answer; degraded
    /// backends surface as fallback mode, never as an error or a hang.
    pub async fn submit_query(&self, text: &str) -> Result<Answer> {
        let reply = self
            .bus
            .request(
                NAME,
                Topic::Query,
                Payload::Query {
                    text: text.to_string(),
                },
                self.query_timeout,
            )
            .await?;

        match reply {
            Payload::Answer(answer) => Ok(answer),
            other => Err(unexpected(other)),
        }
    }

    /// Point-in-time index statistics.
    pub async fn stats(&self) -> Result<IndexStats> {
        let reply = self
            .bus
            .request(NAME, Topic::Context, Payload::StatsRequest, self.request_timeout)
            .await?;
        match reply {
            Payload::StatsReply(stats) => Ok(stats),
            other => Err(unexpected(other)),
        }
    }

    /// Drop every indexed document. Returns the number of removed chunks.
    pub async fn clear(&self) -> Result<usize> {
        let reply = self
            .bus
            .request(NAME, Topic::Context, Payload::ClearRequest, self.request_timeout)
            .await?;
        match reply {
            Payload::Cleared { chunks_removed } => Ok(chunks_removed),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(payload: Payload) -> DocentError {
    DocentError::Bus(BusError::UnexpectedReply {
        payload: payload.name().to_string(),
    })
}

/// Startup sanity check: a bus with no subscribers can never answer
/// anything, so refusing to start beats hanging on the first request.
async fn ensure_agents(bus: &MessageBus) -> std::result::Result<(), ConfigError> {
    if bus.subscriber_count().await == 0 {
        return Err(ConfigError::NoAgents);
    }
    Ok(())
}
