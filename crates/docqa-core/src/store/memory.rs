//! In-memory [`ChunkStore`] implementation.
//!
//! Entries live in a `HashMap` behind a single `parking_lot::RwLock`, with a
//! secondary `document id → chunk ids` index so deletes are exact. Search is
//! brute-force cosine similarity over a consistent snapshot taken under the
//! read lock.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::embedding::{cosine_similarity, Embedder, FeatureEmbedder};
use crate::error::{EmbeddingError, StoreError};
use crate::models::{Chunk, RetrievedChunk, StoreStats};

use super::{AddSummary, ChunkStore, SearchOptions, SIMILARITY_THRESHOLD};

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    by_document: HashMap<String, BTreeSet<String>>,
}

impl State {
    fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) {
        self.by_document
            .entry(chunk.metadata.source_document_id.clone())
            .or_default()
            .insert(chunk.id.clone());
        self.entries.insert(chunk.id.clone(), Entry { chunk, vector });
    }

    fn remove(&mut self, chunk_id: &str) {
        if let Some(entry) = self.entries.remove(chunk_id) {
            let doc_id = &entry.chunk.metadata.source_document_id;
            if let Some(ids) = self.by_document.get_mut(doc_id) {
                ids.remove(chunk_id);
                if ids.is_empty() {
                    self.by_document.remove(doc_id);
                }
            }
        }
    }
}

/// In-memory vector store. Contents do not survive a restart.
pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    dims: usize,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let dims = embedder.dims();
        Self {
            embedder,
            dims,
            state: RwLock::new(State::default()),
        }
    }

    /// Embedding dimensionality shared by every entry.
    pub fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self.embedder.embed(text)?;
        if vector.len() != self.dims {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Score every entry against `query`, best first, above the threshold.
    fn ranked(&self, query: &str) -> Result<Vec<RetrievedChunk>, StoreError> {
        let query_vec = self
            .embed(query)
            .map_err(|e| StoreError::Unavailable(format!("cannot embed query: {}", e)))?;

        let state = self.state.read();
        let mut scored: Vec<(f32, &Chunk)> = state
            .entries
            .values()
            .map(|e| (cosine_similarity(&query_vec, &e.vector), &e.chunk))
            .filter(|(score, _)| *score > SIMILARITY_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        Ok(scored
            .into_iter()
            .map(|(score, chunk)| RetrievedChunk {
                id: chunk.id.clone(),
                content: chunk.content.clone(),
                metadata: chunk.metadata.clone(),
                score,
            })
            .collect())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(FeatureEmbedder::default()))
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn add_documents(&self, chunks: &[Chunk]) -> Result<AddSummary, StoreError> {
        let mut summary = AddSummary::default();
        for chunk in chunks {
            let unchanged = self
                .state
                .read()
                .entries
                .get(&chunk.id)
                .is_some_and(|e| e.chunk.hash == chunk.hash);
            if unchanged {
                debug!(chunk_id = %chunk.id, "chunk unchanged, skipping");
                summary.unchanged += 1;
                continue;
            }

            let vector = self.embed(&chunk.content).map_err(|source| StoreError::Embedding {
                chunk_id: chunk.id.clone(),
                inserted: summary.inserted,
                source,
            })?;

            let mut state = self.state.write();
            state.remove(&chunk.id);
            state.insert(chunk.clone(), vector);
            summary.inserted += 1;
        }
        debug!(
            inserted = summary.inserted,
            unchanged = summary.unchanged,
            "chunks added"
        );
        Ok(summary)
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        if k == 0 || self.state.read().entries.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = self.ranked(query)?;
        results.truncate(k);
        Ok(results)
    }

    async fn advanced_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let candidates = self
            .similarity_search(query, options.k.saturating_mul(2))
            .await?;

        let results = candidates
            .into_iter()
            .filter(|c| options.min_similarity.map_or(true, |min| c.score >= min))
            .filter(|c| {
                options.source_filter.as_ref().map_or(true, |sources| {
                    sources.iter().any(|s| {
                        *s == c.metadata.source_document_id || *s == c.metadata.source_name
                    })
                })
            })
            .filter(|c| {
                options
                    .max_chunk_length
                    .map_or(true, |max| c.content.chars().count() <= max)
            })
            .take(options.k)
            .collect();
        Ok(results)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let ids = state.by_document.remove(document_id).unwrap_or_default();
        for id in &ids {
            state.entries.remove(id);
        }
        debug!(document_id, removed = ids.len(), "document deleted");
        Ok(ids.len())
    }

    async fn prune_document(
        &self,
        document_id: &str,
        keep: &[String],
    ) -> Result<usize, StoreError> {
        let mut state = self.state.write();
        let stale: Vec<String> = state
            .by_document
            .get(document_id)
            .map(|ids| ids.iter().filter(|id| !keep.contains(id)).cloned().collect())
            .unwrap_or_default();
        for id in &stale {
            state.remove(id);
        }
        Ok(stale.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.entries.clear();
        state.by_document.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.read();
        let total_chunks = state.entries.len();
        let total_chars: usize = state
            .entries
            .values()
            .map(|e| e.chunk.content.chars().count())
            .sum();
        let avg_chunk_length = if total_chunks == 0 {
            0.0
        } else {
            total_chars as f64 / total_chunks as f64
        };

        let sources: BTreeSet<String> = state
            .entries
            .values()
            .map(|e| e.chunk.metadata.source_name.clone())
            .collect();

        Ok(StoreStats {
            total_chunks,
            total_documents: state.by_document.len(),
            avg_chunk_length,
            sources: sources.into_iter().collect(),
        })
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>, StoreError> {
        let state = self.state.read();
        let mut chunks: Vec<Chunk> = state.entries.values().map(|e| e.chunk.clone()).collect();
        chunks.sort_by(|a, b| {
            a.metadata
                .source_document_id
                .cmp(&b.metadata.source_document_id)
                .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
        });
        Ok(chunks)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().entries.len())
    }
}
