//! # docqa CLI
//!
//! Ask questions about local documents and get answers grounded in them.
//!
//! ## Usage
//!
//! ```bash
//! docqa [--config docqa.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ask "<question>" --docs <paths>` | Ingest files and answer one question |
//! | `docqa chat --docs <paths>` | Interactive session with conversation memory |
//! | `docqa split <file>` | Show how a file would be chunked |
//! | `docqa check` | Probe the generation backend |
//! | `docqa serve --docs <paths>` | Start the HTTP API |
//!
//! Logs go to stderr (`RUST_LOG` overrides the level) so answers on stdout
//! can be piped.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa::backend::OpenAiCompatibleBackend;
use docqa::config::{self, Config};
use docqa::ingest::{self, IngestSummary};
use docqa::server;
use docqa_core::chunk::{chunk_document, ChunkSplitter};
use docqa_core::embedding::FeatureEmbedder;
use docqa_core::models::QueryResult;
use docqa_core::pipeline::{RagPipeline, StreamEvent};
use docqa_core::store::memory::InMemoryStore;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// docqa: grounded question answering over your documents.
///
/// Without `--config`, built-in defaults are used and the API key is read
/// from `DOCQA_API_KEY` or `OPENAI_API_KEY`.
#[derive(Parser)]
#[command(name = "docqa", version, about = "Ask questions about your documents")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents and answer a single question.
    Ask {
        /// The question to answer.
        question: String,

        /// Files or directories to ingest first.
        #[arg(long, num_args = 1.., required = true)]
        docs: Vec<PathBuf>,

        /// Print the answer as it is generated.
        #[arg(long)]
        stream: bool,
    },

    /// Interactive question answering with conversation memory.
    ///
    /// Type a question per line. `/history`, `/clear`, `/stats`, and
    /// `/quit` are also accepted. Ctrl-C cancels the answer in progress.
    Chat {
        /// Files or directories to ingest first.
        #[arg(long, num_args = 1.., required = true)]
        docs: Vec<PathBuf>,
    },

    /// Show chunk boundaries for a file without calling any backend.
    Split {
        file: PathBuf,

        /// Override `pipeline.chunk_size`.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Override `pipeline.chunk_overlap`.
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Check that the generation backend is reachable.
    Check,

    /// Start the HTTP API.
    Serve {
        /// Files or directories to ingest before serving.
        #[arg(long, num_args = 1..)]
        docs: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "docqa=debug,docqa_core=debug"
    } else {
        "docqa=info,docqa_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Ask {
            question,
            docs,
            stream,
        } => {
            let pipeline = build_pipeline(&config)?;
            ingest_or_bail(&pipeline, &docs, &config).await?;
            let result = if stream {
                stream_answer(&pipeline, &question).await?
            } else {
                let result = pipeline.query(&question).await?;
                println!("{}", result.answer);
                result
            };
            print_sources(&result);
        }
        Commands::Chat { docs } => {
            let pipeline = build_pipeline(&config)?;
            ingest_or_bail(&pipeline, &docs, &config).await?;
            run_chat(&pipeline).await?;
        }
        Commands::Split {
            file,
            chunk_size,
            chunk_overlap,
        } => {
            let splitter = ChunkSplitter::new(
                chunk_size.unwrap_or(config.pipeline.chunk_size),
                chunk_overlap.unwrap_or(config.pipeline.chunk_overlap),
            )?;
            let document = ingest::load_document(&file, config.ingest.max_file_bytes)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let chunks =
                chunk_document(&document.id, &document.name, &document.raw_text, &splitter)?;
            println!(
                "{}: {} chunks (size {}, overlap {})",
                document.name,
                chunks.len(),
                splitter.chunk_size(),
                splitter.chunk_overlap()
            );
            for chunk in &chunks {
                let m = &chunk.metadata;
                let preview: String = chunk.content.chars().take(60).collect();
                let page = m.page.map(|p| format!(" p.{}", p)).unwrap_or_default();
                println!(
                    "  #{:<3} [{}..{}]{} {} chars  {:?}",
                    m.chunk_index,
                    m.start_offset,
                    m.end_offset,
                    page,
                    chunk.content.chars().count(),
                    preview
                );
            }
        }
        Commands::Check => {
            let pipeline = build_pipeline(&config)?;
            if pipeline.test_pipeline().await? {
                println!("ok: {} is reachable", config.backend.base_url);
            } else {
                anyhow::bail!("{} answered but rejected the request", config.backend.base_url);
            }
        }
        Commands::Serve { docs } => {
            let pipeline = build_pipeline(&config)?;
            if !docs.is_empty() {
                ingest_or_bail(&pipeline, &docs, &config).await?;
            }
            server::run_server(&config, pipeline).await?;
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<RagPipeline> {
    let embedder = FeatureEmbedder::new(config.embedding.dims)?;
    let store = Arc::new(InMemoryStore::new(Arc::new(embedder)));
    let backend = Arc::new(
        OpenAiCompatibleBackend::new(&config.backend).context("Failed to build HTTP client")?,
    );
    Ok(RagPipeline::with_store(config.pipeline.clone(), store, backend)?)
}

/// Ingest `docs`, reporting failed files. Fails only when nothing at all
/// could be ingested.
async fn ingest_or_bail(pipeline: &RagPipeline, docs: &[PathBuf], config: &Config) -> Result<()> {
    let summary = ingest::ingest_paths(pipeline, docs, config.ingest.max_file_bytes).await;
    report_ingest(&summary);
    if summary.ingested.is_empty() {
        anyhow::bail!("no documents could be ingested");
    }
    Ok(())
}

fn report_ingest(summary: &IngestSummary) {
    for failed in &summary.failed {
        eprintln!("skipped {}: {}", failed.path.display(), failed.error);
    }
    eprintln!(
        "ingested {} document(s), {} chunk(s)",
        summary.ingested.len(),
        summary.total_chunks()
    );
}

/// Print fragments as they arrive; returns the completed result.
async fn stream_answer(pipeline: &RagPipeline, question: &str) -> Result<QueryResult> {
    let mut stream = pipeline.stream_query(question);
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Searching | StreamEvent::Found { .. } => {}
            StreamEvent::Fragment(text) => {
                print!("{}", text);
                stdout.flush()?;
            }
            StreamEvent::Complete(result) => {
                println!();
                return Ok(result);
            }
        }
    }
    anyhow::bail!("answer stream ended early")
}

fn print_sources(result: &QueryResult) {
    if !result.sources.is_empty() {
        println!("\nSources: {}", result.sources.join(", "));
    }
}

async fn run_chat(pipeline: &RagPipeline) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                pipeline.clear_history();
                println!("history cleared");
            }
            "/history" => {
                for (i, turn) in pipeline.conversation_history().iter().enumerate() {
                    println!("{}. Q: {}\n   A: {}", i + 1, turn.question, turn.answer);
                }
            }
            "/stats" => {
                let stats = pipeline.stats().await?;
                println!(
                    "{} chunks from {} document(s), avg {:.0} chars",
                    stats.total_chunks, stats.total_documents, stats.avg_chunk_length
                );
            }
            question => {
                tokio::select! {
                    outcome = stream_answer(pipeline, question) => match outcome {
                        Ok(result) => print_sources(&result),
                        Err(e) => eprintln!("error: {:#}", e),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        println!("\n(cancelled)");
                    }
                }
            }
        }
    }
    Ok(())
}
