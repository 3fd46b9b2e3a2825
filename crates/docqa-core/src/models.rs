//! Core data models used throughout docqa.
//!
//! These types represent the documents, chunks, and query results that flow
//! through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready { chunks: usize },
    Failed { reason: String },
}

/// A document whose text has been extracted and is ready for chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// Display name, used as the citation label in answers.
    pub name: String,
    pub content_type: String,
    pub raw_text: String,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a pending document with a fresh UUID.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, content_type, raw_text)
    }

    /// Create a pending document with a caller-chosen ID.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        content_type: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_type: content_type.into(),
            raw_text: raw_text.into(),
            status: DocumentStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_document_id: String,
    pub source_name: String,
    pub chunk_index: usize,
    /// Byte offset of the first character in the source text.
    pub start_offset: usize,
    /// Byte offset one past the last character in the source text.
    pub end_offset: usize,
    /// 1-based page number, when the source text carries page breaks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// A bounded segment of a document's text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    /// SHA-256 of `content`, used to skip unchanged chunks on re-ingestion.
    pub hash: String,
    pub metadata: ChunkMetadata,
}

/// A chunk returned from a similarity search, with its score.
///
/// The chunk's embedding never leaves the store.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query, in `(0.1, 1.0]`.
    pub score: f32,
}

/// The outcome of one `query` / `stream_query` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    pub question: String,
    pub retrieved_context: Vec<String>,
    pub answer: String,
    /// Source document names, each listed once in first-cited order.
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl QueryResult {
    pub(crate) fn new(
        question: &str,
        chunks: &[RetrievedChunk],
        answer: String,
    ) -> Self {
        let mut sources: Vec<String> = Vec::new();
        for c in chunks {
            if !sources.contains(&c.metadata.source_name) {
                sources.push(c.metadata.source_name.clone());
            }
        }
        Self {
            id: Uuid::new_v4().to_string(),
            question: question.to_string(),
            retrieved_context: chunks.iter().map(|c| c.content.clone()).collect(),
            answer,
            sources,
            timestamp: Utc::now(),
        }
    }
}

/// One remembered question/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Knowledge-base summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_chunks: usize,
    pub total_documents: usize,
    /// Mean chunk length in characters (0.0 for an empty store).
    pub avg_chunk_length: f64,
    pub sources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(source: &str, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("{}-{}", source, content.len()),
            content: content.to_string(),
            metadata: ChunkMetadata {
                source_document_id: source.to_string(),
                source_name: source.to_string(),
                chunk_index: 0,
                start_offset: 0,
                end_offset: content.len(),
                page: None,
            },
            score: 0.5,
        }
    }

    #[test]
    fn test_query_result_dedups_sources_in_order() {
        let chunks = vec![
            retrieved("b.pdf", "one"),
            retrieved("a.txt", "two"),
            retrieved("b.pdf", "three"),
        ];
        let result = QueryResult::new("q?", &chunks, "answer".to_string());
        assert_eq!(result.sources, vec!["b.pdf", "a.txt"]);
        assert_eq!(result.retrieved_context, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_new_document_is_pending() {
        let doc = Document::new("notes.txt", "text/plain", "hello");
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert!(!doc.id.is_empty());
    }
}
