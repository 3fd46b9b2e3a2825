//! # docqa
//!
//! Grounded question answering over uploaded documents.
//!
//! The retrieval engine lives in the `docqa-core` crate; this crate adds
//! the pieces that touch the outside world:
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  extract   │──▶│    ingest     │──▶│ docqa_core store │
//! │ PDF/DOCX/TXT│   │ files, uploads│   └────────┬─────────┘
//! └────────────┘   └──────────────┘            │
//!                                   ┌───────────┴──────────┐
//!                                   ▼                      ▼
//!                             ┌──────────┐          ┌──────────┐
//!                             │   CLI    │          │   HTTP   │
//!                             │ (docqa)  │          │ JSON/SSE │
//!                             └────┬─────┘          └────┬─────┘
//!                                  └────────┬────────────┘
//!                                           ▼
//!                                ┌────────────────────┐
//!                                │ backend (OpenAI-    │
//!                                │ compatible HTTP)    │
//!                                └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction from PDF, DOCX, and plain text |
//! | [`ingest`] | Files and uploads into the pipeline |
//! | [`backend`] | OpenAI-compatible generation backend |
//! | [`server`] | JSON/SSE HTTP API |

pub mod backend;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod server;
