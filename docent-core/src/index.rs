//! Vector index seam and in-memory reference implementation.
//!
//! The retrieval agent is the only writer; the trait exposes exactly the
//! operations it needs: embed, upsert, remove, ranked search. The reference
//! implementation embeds with a hashed term-frequency vector (L2-normalized,
//! so the dot product is cosine similarity) and searches by brute force,
//! which is deterministic and plenty for in-process corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::IndexError;
use crate::types::EmbeddingRecord;

/// One ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: String,
    pub score: f32,
}

/// Embedding and nearest-neighbor collaborator.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embed a text into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;

    /// Insert or overwrite the record for its chunk ID.
    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), IndexError>;

    /// Remove the record for a chunk ID. Unknown IDs are a no-op.
    async fn remove(&self, chunk_id: &str) -> Result<(), IndexError>;

    /// Top-k records by similarity to `vector`, descending.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError>;

    /// Number of stored records.
    async fn count(&self) -> usize;

    /// Embedding dimensionality.
    fn dimensions(&self) -> usize;
}

/// In-memory reference index.
pub struct InMemoryIndex {
    dimensions: usize,
    records: Mutex<HashMap<String, EmbeddingRecord>>,
}

impl InMemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Hashed term-frequency embedding, L2-normalized.
    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty());

        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in words {
            *tf.entry(word).or_insert(0) += 1;
        }
        if tf.is_empty() {
            return vector;
        }

        for (term, count) in &tf {
            let idx = term_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// djb2-style string hash.
fn term_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        Ok(self.embed_text(text))
    }

    async fn upsert(&self, record: EmbeddingRecord) -> Result<(), IndexError> {
        if record.vector.len() != self.dimensions {
            return Err(IndexError::Store {
                message: format!(
                    "Vector for '{}' has {} dimensions, index expects {}",
                    record.chunk_id,
                    record.vector.len(),
                    self.dimensions
                ),
            });
        }
        self.records
            .lock()
            .await
            .insert(record.chunk_id.clone(), record);
        Ok(())
    }

    async fn remove(&self, chunk_id: &str) -> Result<(), IndexError> {
        self.records.lock().await.remove(chunk_id);
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let records = self.records.lock().await;
        let mut hits: Vec<SearchHit> = records
            .values()
            .map(|record| SearchHit {
                chunk_id: record.chunk_id.clone(),
                score: dot(vector, &record.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> usize {
        self.records.lock().await.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
