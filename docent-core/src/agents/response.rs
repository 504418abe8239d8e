//! Response agent: turns a question into an answer.
//!
//! The answer mode is decided once at construction, from whether a
//! generator was supplied, and threaded explicitly from there. Nothing on
//! the query path can fail hard: retrieval trouble shrinks the context to
//! empty and generator trouble drops the answer to fallback, so a live
//! pipeline always produces an answer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::{MessageBus, Subscriber};
use crate::generation::Generator;
use crate::types::{Answer, AnswerMode, Message, Payload, RetrievedContext, SourceRef, Topic};

const NAME: &str = "response";

const INSTRUCTION_PREAMBLE: &str = "You are a document assistant. Answer the question using only the \
numbered context passages below. Cite passage numbers like [1] where relevant. If the passages do \
not contain the answer, say so plainly instead of guessing.";

const FALLBACK_DISCLAIMER: &str = "No generated answer is available. The most relevant passages \
from your documents are quoted below.";

const NO_CONTEXT_TEXT: &str = "No relevant context was found in the indexed documents for this \
question. Try ingesting the relevant documents first, or rephrase the question.";

/// Orchestrates query answering: context retrieval, prompt assembly, and
/// generation with graceful degradation.
pub struct ResponseAgent {
    bus: Arc<MessageBus>,
    generator: Option<Arc<dyn Generator>>,
    mode: AnswerMode,
    retrieval_timeout: Duration,
}

impl ResponseAgent {
    pub fn new(
        bus: Arc<MessageBus>,
        generator: Option<Arc<dyn Generator>>,
        retrieval_timeout: Duration,
    ) -> Self {
        let mode = match generator {
            Some(_) => AnswerMode::Generative,
            None => AnswerMode::Fallback,
        };
        tracing::info!(mode = ?mode, "Response agent configured");
        Self {
            bus,
            generator,
            mode,
            retrieval_timeout,
        }
    }

    /// The mode this agent answers in when its generator cooperates.
    pub fn mode(&self) -> AnswerMode {
        self.mode
    }

    async fn answer_query(&self, text: &str) -> Answer {
        let context = self.fetch_context(text).await;
        let sources: Vec<SourceRef> = context
            .hits
            .iter()
            .map(|hit| SourceRef {
                doc_id: hit.chunk.doc_id.clone(),
                chunk_index: hit.chunk.chunk_index,
                score: hit.score,
            })
            .collect();

        if let (AnswerMode::Generative, Some(generator)) = (self.mode, &self.generator) {
            let prompt = build_prompt(text, &context);
            match generator.generate(&prompt).await {
                Ok(generated) => {
                    tracing::debug!(chars = generated.len(), "Generated answer");
                    return Answer {
                        text: generated,
                        sources,
                        mode: AnswerMode::Generative,
                    };
                }
                Err(error) => {
                    tracing::warn!(%error, "Generation failed, falling back to retrieved text");
                }
            }
        }

        Answer {
            text: fallback_text(&context),
            sources,
            mode: AnswerMode::Fallback,
        }
    }

    /// Fetch ranked context for the question. Any failure here (timeout,
    /// missing retrieval agent, a reported retrieval error) yields an
    /// empty context rather than an error.
    async fn fetch_context(&self, text: &str) -> RetrievedContext {
        let reply = self
            .bus
            .request(
                NAME,
                Topic::Context,
                Payload::ContextRequest {
                    text: text.to_string(),
                },
                self.retrieval_timeout,
            )
            .await;

        match reply {
            Ok(Payload::ContextReply { context }) => context,
            Ok(Payload::ErrorReport { message, .. }) => {
                tracing::warn!(message, "Retrieval reported an error, answering without context");
                RetrievedContext::default()
            }
            Ok(other) => {
                tracing::error!(
                    payload = other.name(),
                    "Unexpected reply to context request"
                );
                RetrievedContext::default()
            }
            Err(error) => {
                tracing::warn!(%error, "Context retrieval failed, answering without context");
                RetrievedContext::default()
            }
        }
    }
}

/// Instruction preamble, enumerated passages tagged with their source, then
/// the question.
fn build_prompt(question: &str, context: &RetrievedContext) -> String {
    let mut prompt = String::from(INSTRUCTION_PREAMBLE);
    prompt.push_str("\n\nContext passages:\n");
    if context.is_empty() {
        prompt.push_str("(no passages were retrieved)\n");
    }
    for (i, hit) in context.hits.iter().enumerate() {
        prompt.push_str(&format!(
            "\n[{}] {} ({})\n{}\n",
            i + 1,
            hit.chunk.doc_id,
            hit.chunk.location,
            hit.chunk.text
        ));
    }
    prompt.push_str(&format!("\nQuestion: {question}\nAnswer:"));
    prompt
}

/// Disclaimer plus the retrieved passages verbatim, best first.
fn fallback_text(context: &RetrievedContext) -> String {
    if context.is_empty() {
        return NO_CONTEXT_TEXT.to_string();
    }
    let mut text = String::from(FALLBACK_DISCLAIMER);
    for (i, hit) in context.hits.iter().enumerate() {
        text.push_str(&format!(
            "\n\n[{}] {} ({}):\n{}",
            i + 1,
            hit.chunk.doc_id,
            hit.chunk.location,
            hit.chunk.text
        ));
    }
    text
}

#[async_trait]
impl Subscriber for ResponseAgent {
    fn name(&self) -> &str {
        NAME
    }

    async fn handle(&self, message: Message) {
        match message.payload {
            Payload::Query { ref text } => {
                let answer = self.answer_query(text).await;
                match message.correlation_id {
                    Some(corr) => {
                        self.bus.reply(NAME, corr, Payload::Answer(answer)).await;
                    }
                    None => {
                        self.bus
                            .publish(NAME, Topic::Answer, Payload::Answer(answer))
                            .await;
                    }
                }
            }
            other => {
                tracing::error!(
                    topic = %message.topic,
                    payload = other.name(),
                    "Unexpected payload for response agent"
                );
            }
        }
    }
}
