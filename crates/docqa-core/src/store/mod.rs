//! Storage abstraction for docqa.
//!
//! The [`ChunkStore`] trait defines every operation the pipeline needs from
//! a vector store, so retrieval backends can be swapped (and mocked in
//! tests) without touching the orchestrator.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Chunk, RetrievedChunk, StoreStats};

/// Scores at or below this value are never returned from a search.
pub const SIMILARITY_THRESHOLD: f32 = 0.1;

/// Filters for [`ChunkStore::advanced_search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results.
    pub k: usize,
    /// Drop results scoring below this value (applied on top of
    /// [`SIMILARITY_THRESHOLD`]).
    pub min_similarity: Option<f32>,
    /// Allow-list of sources; matches either the document ID or the
    /// document name.
    pub source_filter: Option<Vec<String>>,
    /// Drop chunks longer than this many characters.
    pub max_chunk_length: Option<usize>,
}

impl SearchOptions {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            min_similarity: None,
            source_filter: None,
            max_chunk_length: None,
        }
    }
}

/// Outcome of a successful [`ChunkStore::add_documents`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddSummary {
    /// Chunks embedded and inserted (new or changed).
    pub inserted: usize,
    /// Chunks skipped because an identical copy was already stored.
    pub unchanged: usize,
}

/// Abstract vector store.
///
/// All operations are async (via `async-trait`) so remote or disk-backed
/// stores fit behind the same seam. In-memory implementations return
/// immediately-ready futures.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add_documents`](ChunkStore::add_documents) | Embed and insert chunks |
/// | [`similarity_search`](ChunkStore::similarity_search) | Top-k by cosine similarity |
/// | [`advanced_search`](ChunkStore::advanced_search) | Top-k with extra filters |
/// | [`delete_document`](ChunkStore::delete_document) | Remove one document's chunks |
/// | [`prune_document`](ChunkStore::prune_document) | Drop stale chunks after re-ingestion |
/// | [`clear`](ChunkStore::clear) | Remove everything |
/// | [`stats`](ChunkStore::stats) | Knowledge-base summary |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Embed and insert `chunks` in order.
    ///
    /// A chunk whose ID and hash match a stored entry is skipped. Insertion
    /// stops at the first embedding failure; chunks inserted earlier in the
    /// same call stay committed and the error reports how many.
    async fn add_documents(&self, chunks: &[Chunk]) -> Result<AddSummary, StoreError>;

    /// Return at most `k` chunks scoring above [`SIMILARITY_THRESHOLD`],
    /// best first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Similarity search with post-filters. Over-fetches `2k` candidates
    /// before filtering, so fewer than `k` results may come back even when
    /// more would match.
    async fn advanced_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    /// Remove every chunk of `document_id`. Returns the number removed.
    async fn delete_document(&self, document_id: &str) -> Result<usize, StoreError>;

    /// Remove chunks of `document_id` whose IDs are not in `keep`.
    async fn prune_document(
        &self,
        document_id: &str,
        keep: &[String],
    ) -> Result<usize, StoreError>;

    /// Remove everything.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Knowledge-base summary.
    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Every stored chunk, ordered by document then chunk index.
    async fn all_chunks(&self) -> Result<Vec<Chunk>, StoreError>;

    /// Number of stored chunks.
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}
