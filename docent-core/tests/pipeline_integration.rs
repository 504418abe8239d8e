//! End-to-end tests driving the assembled pipeline through its front-end
//! contract: ingest documents, ask questions, observe lifecycle status.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use docent_core::error::IndexError;
use docent_core::{
    AnswerMode, DocentConfig, DocumentStatus, EmbeddingRecord, InMemoryIndex, Message, MessageBus,
    Payload, Pipeline, PlainTextParser, SearchHit, Subscriber, Topic, VectorIndex,
};

fn test_config() -> DocentConfig {
    let mut config = DocentConfig::default();
    config.retrieval.dimensions = 128;
    config.bus.request_timeout_ms = 2_000;
    config.bus.query_timeout_ms = 4_000;
    config
}

async fn fallback_pipeline(config: &DocentConfig) -> Pipeline {
    Pipeline::new(
        config,
        Arc::new(PlainTextParser::new()),
        Arc::new(InMemoryIndex::new(config.retrieval.dimensions)),
        None,
    )
    .await
    .unwrap()
}

async fn pipeline_with_index(config: &DocentConfig, index: Arc<dyn VectorIndex>) -> Pipeline {
    Pipeline::new(config, Arc::new(PlainTextParser::new()), index, None)
        .await
        .unwrap()
}

/// Collects document status transitions from the Status topic.
struct StatusRecorder {
    seen: Mutex<Vec<(String, DocumentStatus)>>,
}

impl StatusRecorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }

    fn statuses_for(&self, doc_id: &str) -> Vec<DocumentStatus> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == doc_id)
            .map(|(_, status)| status.clone())
            .collect()
    }

    async fn wait_for(&self, doc_id: &str, status: &DocumentStatus) {
        for _ in 0..400 {
            if self.statuses_for(doc_id).contains(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("Document '{doc_id}' never reached status {status} (saw {:?})", self.statuses_for(doc_id));
    }
}

#[async_trait]
impl Subscriber for StatusRecorder {
    fn name(&self) -> &str {
        "status-recorder"
    }

    async fn handle(&self, message: Message) {
        if let Payload::StatusUpdate { doc_id, status } = message.payload {
            self.seen.lock().unwrap().push((doc_id, status));
        }
    }
}

async fn watch_status(bus: &Arc<MessageBus>) -> Arc<StatusRecorder> {
    let recorder = StatusRecorder::new();
    bus.subscribe(Topic::Status, recorder.clone()).await;
    recorder
}

/// Wraps the in-memory index with failure injection for embed calls.
struct FlakyIndex {
    inner: InMemoryIndex,
    /// While set, every embed call fails.
    failing: AtomicBool,
    /// Embed calls left to fail when `failing` is off (for retry tests).
    fail_next: AtomicUsize,
    embed_calls: AtomicUsize,
}

impl FlakyIndex {
    fn new(dimensions: usize) -> Self {
        Self {
            inner: InMemoryIndex::new(dimensions),
            failing: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorIndex for FlakyIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(IndexError::Embedding {
                message: "embedder offline".into(),
            });
        }
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(IndexError::Embedding {
                message: "transient embedder hiccup".into(),
            });
        }
        self.inner.embed(text).await
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), IndexError> {
        self.inner.upsert(record).await
    }

    async fn remove(&self, chunk_id: &str) -> Result<(), IndexError> {
        self.inner.remove(chunk_id).await
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.inner.search(vector, k).await
    }

    async fn count(&self) -> usize {
        self.inner.count().await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Delays every embed call, to exercise the retrieval timeout path.
struct SlowIndex {
    inner: InMemoryIndex,
    delay: Duration,
}

#[async_trait]
impl VectorIndex for SlowIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(text).await
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), IndexError> {
        self.inner.upsert(record).await
    }

    async fn remove(&self, chunk_id: &str) -> Result<(), IndexError> {
        self.inner.remove(chunk_id).await
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        self.inner.search(vector, k).await
    }

    async fn count(&self) -> usize {
        self.inner.count().await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[tokio::test]
async fn test_round_trip_returns_ingested_chunk_as_top_hit() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;
    let recorder = watch_status(&pipeline.bus()).await;

    let doc = "The message bus routes every payload by topic.\n\n\
               Chunks carry their own document identifier.\n\n\
               Retrieval ranks passages by cosine similarity.";
    let receipt = pipeline
        .submit_document(doc.as_bytes().to_vec(), "handbook.txt")
        .await
        .unwrap();
    assert_eq!(receipt.chunks, 3);
    recorder.wait_for("handbook.txt", &DocumentStatus::Ready).await;

    let answer = pipeline
        .submit_query("Chunks carry their own document identifier.")
        .await
        .unwrap();
    assert_eq!(answer.mode, AnswerMode::Fallback);
    assert!(!answer.sources.is_empty());
    // The exact ingested sentence wins the ranking.
    assert_eq!(answer.sources[0].doc_id, "handbook.txt");
    assert_eq!(answer.sources[0].chunk_index, 1);
    assert!(answer.text.contains("Chunks carry their own document identifier."));
}

#[tokio::test]
async fn test_reingestion_replaces_instead_of_duplicating() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;
    let recorder = watch_status(&pipeline.bus()).await;

    let v1 = "alpha first paragraph\n\nalpha second paragraph\n\nalpha third paragraph";
    pipeline
        .submit_document(v1.as_bytes().to_vec(), "doc.txt")
        .await
        .unwrap();
    recorder.wait_for("doc.txt", &DocumentStatus::Ready).await;

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 3);

    // Same doc_id, different content and chunk count.
    let v2 = "beta replacement one\n\nbeta replacement two";
    pipeline
        .submit_document(v2.as_bytes().to_vec(), "doc.txt")
        .await
        .unwrap();
    for _ in 0..400 {
        if pipeline.stats().await.unwrap().chunks == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.documents, 1, "Replacement must not add a document");
    assert_eq!(stats.chunks, 2, "Old generation chunks must be gone");

    // The replaced content is what retrieval now serves.
    let answer = pipeline.submit_query("beta replacement one").await.unwrap();
    assert_eq!(answer.sources[0].chunk_index, 0);
    assert!(answer.text.contains("beta replacement one"));
}

#[tokio::test]
async fn test_ingesting_same_content_twice_keeps_chunk_count() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;
    let recorder = watch_status(&pipeline.bus()).await;

    let doc = "one\n\ntwo\n\nthree";
    for _ in 0..2 {
        pipeline
            .submit_document(doc.as_bytes().to_vec(), "dup.txt")
            .await
            .unwrap();
    }
    recorder.wait_for("dup.txt", &DocumentStatus::Ready).await;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if recorder
            .statuses_for("dup.txt")
            .iter()
            .filter(|s| **s == DocumentStatus::Ready)
            .count()
            == 2
        {
            break;
        }
    }

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.chunks, 3, "Expected N chunks after double ingest, never 2N");
}

#[tokio::test]
async fn test_concurrent_ingestion_keeps_indices_independent() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;
    let recorder = watch_status(&pipeline.bus()).await;

    // Every paragraph shares the token "alpha" so one query ranks them all.
    let doc_a = "alpha apple one\n\nalpha banana two\n\nalpha cherry three";
    let doc_b = "alpha dog four\n\nalpha eagle five";

    let (a, b) = tokio::join!(
        pipeline.submit_document(doc_a.as_bytes().to_vec(), "a.txt"),
        pipeline.submit_document(doc_b.as_bytes().to_vec(), "b.txt"),
    );
    assert_eq!(a.unwrap().chunks, 3);
    assert_eq!(b.unwrap().chunks, 2);
    recorder.wait_for("a.txt", &DocumentStatus::Ready).await;
    recorder.wait_for("b.txt", &DocumentStatus::Ready).await;

    let answer = pipeline.submit_query("alpha").await.unwrap();
    let mut indices_a: Vec<usize> = answer
        .sources
        .iter()
        .filter(|s| s.doc_id == "a.txt")
        .map(|s| s.chunk_index)
        .collect();
    let mut indices_b: Vec<usize> = answer
        .sources
        .iter()
        .filter(|s| s.doc_id == "b.txt")
        .map(|s| s.chunk_index)
        .collect();
    indices_a.sort_unstable();
    indices_b.sort_unstable();
    assert_eq!(indices_a, vec![0, 1, 2]);
    assert_eq!(indices_b, vec![0, 1]);
}

#[tokio::test]
async fn test_status_lifecycle_in_order() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;
    let recorder = watch_status(&pipeline.bus()).await;

    pipeline
        .submit_document(b"a single paragraph".to_vec(), "life.txt")
        .await
        .unwrap();
    recorder.wait_for("life.txt", &DocumentStatus::Ready).await;

    let statuses = recorder.statuses_for("life.txt");
    assert_eq!(
        statuses,
        vec![
            DocumentStatus::Uploaded,
            DocumentStatus::Chunked,
            DocumentStatus::Embedded,
            DocumentStatus::Indexed,
            DocumentStatus::Ready,
        ]
    );
}

#[tokio::test]
async fn test_query_with_empty_index_still_answers() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;

    let answer = pipeline.submit_query("is anyone home?").await.unwrap();
    assert_eq!(answer.mode, AnswerMode::Fallback);
    assert!(answer.sources.is_empty());
    assert!(answer.text.contains("No relevant context was found"));
}

#[tokio::test]
async fn test_slow_retrieval_falls_back_within_timeout() {
    let mut config = test_config();
    config.bus.request_timeout_ms = 150;

    let index = Arc::new(SlowIndex {
        inner: InMemoryIndex::new(config.retrieval.dimensions),
        delay: Duration::from_millis(800),
    });
    let pipeline = pipeline_with_index(&config, index).await;

    let start = Instant::now();
    let answer = pipeline.submit_query("anything at all").await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(answer.mode, AnswerMode::Fallback);
    assert!(answer.sources.is_empty());
    assert!(
        elapsed < Duration::from_millis(700),
        "Expected a prompt fallback answer, took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_transient_embed_failure_is_retried() {
    let config = test_config();
    let index = Arc::new(FlakyIndex::new(config.retrieval.dimensions));
    index.fail_next.store(1, Ordering::SeqCst);
    let pipeline = pipeline_with_index(&config, index.clone()).await;
    let recorder = watch_status(&pipeline.bus()).await;

    pipeline
        .submit_document(b"only paragraph".to_vec(), "flaky.txt")
        .await
        .unwrap();
    recorder.wait_for("flaky.txt", &DocumentStatus::Ready).await;

    assert_eq!(pipeline.stats().await.unwrap().chunks, 1);
    // One failed call plus the retry.
    assert_eq!(index.embed_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_persistent_embed_failure_keeps_prior_generation() {
    let config = test_config();
    let index = Arc::new(FlakyIndex::new(config.retrieval.dimensions));
    let pipeline = pipeline_with_index(&config, index.clone()).await;
    let recorder = watch_status(&pipeline.bus()).await;

    pipeline
        .submit_document(b"stable original content".to_vec(), "doc.txt")
        .await
        .unwrap();
    recorder.wait_for("doc.txt", &DocumentStatus::Ready).await;
    assert_eq!(pipeline.stats().await.unwrap().chunks, 1);

    // Replacement attempt while the embedder is down.
    index.failing.store(true, Ordering::SeqCst);
    pipeline
        .submit_document(b"replacement that cannot embed".to_vec(), "doc.txt")
        .await
        .unwrap();
    recorder
        .wait_for(
            "doc.txt",
            &DocumentStatus::Failed {
                reason: "Embedding failed: embedder offline".into(),
            },
        )
        .await;

    // The failed batch never touched the index.
    assert_eq!(pipeline.stats().await.unwrap().chunks, 1);
    index.failing.store(false, Ordering::SeqCst);
    let answer = pipeline.submit_query("stable original content").await.unwrap();
    assert!(answer.text.contains("stable original content"));
}

#[tokio::test]
async fn test_clear_empties_the_corpus() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;
    let recorder = watch_status(&pipeline.bus()).await;

    pipeline
        .submit_document(b"one\n\ntwo".to_vec(), "doc.txt")
        .await
        .unwrap();
    recorder.wait_for("doc.txt", &DocumentStatus::Ready).await;

    let removed = pipeline.clear().await.unwrap();
    assert_eq!(removed, 2);
    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.documents, 0);
    assert_eq!(stats.chunks, 0);

    let answer = pipeline.submit_query("one").await.unwrap();
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn test_rejected_document_reports_and_indexes_nothing() {
    let config = test_config();
    let pipeline = fallback_pipeline(&config).await;
    let recorder = watch_status(&pipeline.bus()).await;

    let err = pipeline
        .submit_document(b"\x50\x4b\x03\x04".to_vec(), "deck.pptx")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Unsupported document format"));
    recorder
        .wait_for(
            "deck.pptx",
            &DocumentStatus::Failed {
                reason: "Unsupported document format: 'pptx'".into(),
            },
        )
        .await;
    assert_eq!(pipeline.stats().await.unwrap().chunks, 0);
}
