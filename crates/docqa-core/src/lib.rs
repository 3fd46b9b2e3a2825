//! # docqa core
//!
//! Retrieval and orchestration for grounded document question answering:
//! text chunking, feature embeddings, an in-memory vector store, prompt
//! assembly, bounded conversation memory, and the query pipeline (both
//! one-shot and streaming).
//!
//! This crate does no network or filesystem I/O. Language models are
//! reached through the [`generation::GenerationBackend`] trait, which the
//! `docqa` binary implements over HTTP.
//!
//! ```text
//! text ─► chunk ─► embedding ─► store
//! question ─► store ─► prompt (+ memory) ─► backend ─► QueryResult
//! ```

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod memory;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod store;
