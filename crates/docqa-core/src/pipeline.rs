//! Query orchestration.
//!
//! [`RagPipeline`] wires the store, the generation backend, the active
//! configuration, and conversation memory together. Each query runs as one
//! sequential pass:
//!
//! ```text
//! question ─► similarity_search ─► format_context ─┐
//!                                 recent turns ────┼─► build_prompt ─► backend ─► QueryResult
//!                                                  │                                │
//!                                                  └──────────── memory.push ◄──────┘
//! ```
//!
//! Retrieval failures degrade to the fallback answer. Generation failures
//! end the query and leave memory untouched.
//!
//! # Streaming
//!
//! [`RagPipeline::stream_query`] returns a [`QueryStream`] that does no work
//! until polled and pulls one backend fragment per poll. The completed turn
//! is committed to memory in the same poll that yields
//! [`StreamEvent::Complete`]; dropping the stream before then discards the
//! partial answer.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_document, ChunkSplitter};
use crate::config::{ConfigPatch, PipelineConfig};
use crate::error::{GenerationError, PipelineError};
use crate::generation::{FragmentStream, GenerationBackend};
use crate::memory::ConversationMemory;
use crate::models::{Document, DocumentStatus, QueryResult, RetrievedChunk, StoreStats, Turn};
use crate::prompt::{build_prompt, format_context, FALLBACK_ANSWER, HISTORY_TURNS};
use crate::store::memory::InMemoryStore;
use crate::store::ChunkStore;

/// Progress of a streamed query.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Retrieval has started.
    Searching,
    /// Retrieval finished with this many chunks.
    Found { chunks: usize },
    /// The next piece of the answer.
    Fragment(String),
    /// The answer is complete and has been committed to memory.
    Complete(QueryResult),
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks: usize,
    pub inserted: usize,
    pub unchanged: usize,
    /// Chunks left over from an earlier, longer version of the document.
    pub pruned: usize,
}

/// Pull-based stream of [`StreamEvent`]s for one query.
pub struct QueryStream {
    inner: BoxStream<'static, Result<StreamEvent, PipelineError>>,
}

impl QueryStream {
    fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<StreamEvent, PipelineError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// Drive the stream to the end and return the final result.
    pub async fn into_result(mut self) -> Result<QueryResult, PipelineError> {
        while let Some(event) = self.next().await {
            if let StreamEvent::Complete(result) = event? {
                return Ok(result);
            }
        }
        Err(GenerationError::Stream("stream ended without a result".to_string()).into())
    }
}

impl Stream for QueryStream {
    type Item = Result<StreamEvent, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Where a streamed query is between polls.
enum Phase {
    Start(String),
    Retrieve(String),
    Fallback(String),
    FallbackComplete(String),
    Open {
        question: String,
        chunks: Vec<RetrievedChunk>,
    },
    Streaming {
        question: String,
        chunks: Vec<RetrievedChunk>,
        fragments: FragmentStream,
        answer: String,
    },
    Done,
}

/// The question-answering engine. Clones share all state.
#[derive(Clone)]
pub struct RagPipeline {
    store: Arc<dyn ChunkStore>,
    backend: Arc<dyn GenerationBackend>,
    config: Arc<RwLock<PipelineConfig>>,
    memory: Arc<Mutex<ConversationMemory>>,
}

impl RagPipeline {
    /// Build a pipeline over a fresh [`InMemoryStore`].
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, PipelineError> {
        Self::with_store(config, Arc::new(InMemoryStore::default()), backend)
    }

    pub fn with_store(
        config: PipelineConfig,
        store: Arc<dyn ChunkStore>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        info!(
            model = %config.model,
            backend = backend.name(),
            top_k = config.top_k,
            "pipeline ready"
        );
        Ok(Self {
            store,
            backend,
            config: Arc::new(RwLock::new(config)),
            memory: Arc::new(Mutex::new(ConversationMemory::default())),
        })
    }

    /// Chunk `document` with the active splitter settings and add it to the
    /// store. The document's status ends as `Ready` or `Failed`.
    pub async fn ingest(&self, document: &mut Document) -> Result<IngestReport, PipelineError> {
        document.status = DocumentStatus::Processing;
        match self.ingest_inner(document).await {
            Ok(report) => {
                document.status = DocumentStatus::Ready {
                    chunks: report.chunks,
                };
                info!(
                    document = %document.name,
                    chunks = report.chunks,
                    inserted = report.inserted,
                    unchanged = report.unchanged,
                    "document ingested"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(document = %document.name, error = %e, "ingestion failed");
                document.status = DocumentStatus::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn ingest_inner(&self, document: &Document) -> Result<IngestReport, PipelineError> {
        let (chunk_size, chunk_overlap) = {
            let config = self.config.read();
            (config.chunk_size, config.chunk_overlap)
        };
        let splitter = ChunkSplitter::new(chunk_size, chunk_overlap)?;
        let chunks = chunk_document(&document.id, &document.name, &document.raw_text, &splitter)?;
        debug!(document = %document.name, chunks = chunks.len(), "document split");

        let summary = self.store.add_documents(&chunks).await?;
        let keep: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let pruned = self.store.prune_document(&document.id, &keep).await?;

        Ok(IngestReport {
            document_id: document.id.clone(),
            chunks: chunks.len(),
            inserted: summary.inserted,
            unchanged: summary.unchanged,
            pruned,
        })
    }

    /// Answer `question` from the knowledge base in one call.
    pub async fn query(&self, question: &str) -> Result<QueryResult, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }
        let config = self.config();

        let chunks = self.retrieve(question, config.top_k).await;
        if chunks.is_empty() {
            info!("no relevant chunks, returning fallback answer");
            return Ok(QueryResult::new(question, &[], FALLBACK_ANSWER.to_string()));
        }

        let prompt = self.prompt_for(question, &chunks);
        let answer = self
            .backend
            .generate(&prompt, &config.generation_params())
            .await?;
        if answer.trim().is_empty() {
            return Err(GenerationError::EmptyResponse.into());
        }

        let result = QueryResult::new(question, &chunks, answer);
        self.remember(&result);
        Ok(result)
    }

    /// Answer `question` incrementally. See the module docs for the
    /// cancellation contract.
    pub fn stream_query(&self, question: &str) -> QueryStream {
        let start = (self.clone(), Phase::Start(question.trim().to_string()));
        QueryStream::new(stream::unfold(start, |(pipeline, phase)| async move {
            pipeline
                .advance(phase)
                .await
                .map(|(event, next)| (event, (pipeline, next)))
        }))
    }

    /// Run the query state machine until it has one event to yield.
    async fn advance(
        &self,
        mut phase: Phase,
    ) -> Option<(Result<StreamEvent, PipelineError>, Phase)> {
        loop {
            phase = match phase {
                Phase::Done => return None,
                Phase::Start(question) => {
                    if question.is_empty() {
                        return Some((Err(PipelineError::EmptyQuestion), Phase::Done));
                    }
                    return Some((Ok(StreamEvent::Searching), Phase::Retrieve(question)));
                }
                Phase::Retrieve(question) => {
                    let top_k = self.config.read().top_k;
                    let chunks = self.retrieve(&question, top_k).await;
                    let event = StreamEvent::Found {
                        chunks: chunks.len(),
                    };
                    let next = if chunks.is_empty() {
                        Phase::Fallback(question)
                    } else {
                        Phase::Open { question, chunks }
                    };
                    return Some((Ok(event), next));
                }
                Phase::Fallback(question) => {
                    return Some((
                        Ok(StreamEvent::Fragment(FALLBACK_ANSWER.to_string())),
                        Phase::FallbackComplete(question),
                    ));
                }
                Phase::FallbackComplete(question) => {
                    let result = QueryResult::new(&question, &[], FALLBACK_ANSWER.to_string());
                    return Some((Ok(StreamEvent::Complete(result)), Phase::Done));
                }
                Phase::Open { question, chunks } => {
                    let prompt = self.prompt_for(&question, &chunks);
                    let params = self.config.read().generation_params();
                    match self.backend.stream(&prompt, &params).await {
                        Ok(fragments) => Phase::Streaming {
                            question,
                            chunks,
                            fragments,
                            answer: String::new(),
                        },
                        Err(e) => return Some((Err(e.into()), Phase::Done)),
                    }
                }
                Phase::Streaming {
                    question,
                    chunks,
                    mut fragments,
                    mut answer,
                } => {
                    let pulled = fragments.next().await;
                    match pulled {
                        Some(Ok(fragment)) if fragment.is_empty() => Phase::Streaming {
                            question,
                            chunks,
                            fragments,
                            answer,
                        },
                        Some(Ok(fragment)) => {
                            answer.push_str(&fragment);
                            let next = Phase::Streaming {
                                question,
                                chunks,
                                fragments,
                                answer,
                            };
                            return Some((Ok(StreamEvent::Fragment(fragment)), next));
                        }
                        Some(Err(e)) => return Some((Err(e.into()), Phase::Done)),
                        None if answer.trim().is_empty() => {
                            return Some((Err(GenerationError::EmptyResponse.into()), Phase::Done));
                        }
                        None => {
                            let result = QueryResult::new(&question, &chunks, answer);
                            self.remember(&result);
                            return Some((Ok(StreamEvent::Complete(result)), Phase::Done));
                        }
                    }
                }
            };
        }
    }

    async fn retrieve(&self, question: &str, top_k: usize) -> Vec<RetrievedChunk> {
        match self.store.similarity_search(question, top_k).await {
            Ok(chunks) => {
                debug!(found = chunks.len(), "retrieval finished");
                chunks
            }
            Err(e) => {
                warn!(error = %e, "retrieval failed, answering without context");
                Vec::new()
            }
        }
    }

    fn prompt_for(&self, question: &str, chunks: &[RetrievedChunk]) -> String {
        let recent = self.memory.lock().recent(HISTORY_TURNS);
        build_prompt(question, &format_context(chunks), &recent)
    }

    fn remember(&self, result: &QueryResult) {
        self.memory
            .lock()
            .push(Turn::new(result.question.clone(), result.answer.clone()));
    }

    pub fn clear_history(&self) {
        self.memory.lock().clear();
        info!("conversation history cleared");
    }

    /// Empty the store and the conversation history together.
    pub async fn clear_knowledge_base(&self) -> Result<(), PipelineError> {
        self.store.clear().await?;
        self.memory.lock().clear();
        info!("knowledge base cleared");
        Ok(())
    }

    /// Merge `patch` into the active configuration. On any invalid field
    /// the whole update is rejected and the old configuration stays.
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<PipelineConfig, PipelineError> {
        let mut config = self.config.write();
        let next = config.merged(patch)?;
        *config = next.clone();
        info!(model = %next.model, top_k = next.top_k, "configuration updated");
        Ok(next)
    }

    /// Probe the generation backend once. Changes no state.
    pub async fn test_pipeline(&self) -> Result<bool, PipelineError> {
        let params = self.config.read().generation_params();
        let ok = self.backend.test_connection(&params).await?;
        info!(backend = self.backend.name(), ok, "backend probe finished");
        Ok(ok)
    }

    /// Remembered turns, oldest first.
    pub fn conversation_history(&self) -> Vec<Turn> {
        self.memory.lock().turns()
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> PipelineConfig {
        self.config.read().clone()
    }

    pub async fn stats(&self) -> Result<StoreStats, PipelineError> {
        Ok(self.store.stats().await?)
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<usize, PipelineError> {
        Ok(self.store.delete_document(document_id).await?)
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }
}
