//! File ingestion: path or upload → extracted text → pipeline.
//!
//! Each file is handled independently. A file that cannot be read or
//! extracted is reported and skipped; the others are still ingested.

use std::path::{Path, PathBuf};

use docqa_core::error::PipelineError;
use docqa_core::models::Document;
use docqa_core::pipeline::{IngestReport, RagPipeline};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::extract::{content_type_for_path, extract_text, ExtractError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file type: {0}")]
    UnknownExtension(PathBuf),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// A file that could not be ingested.
#[derive(Debug)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: IngestError,
}

/// Result of ingesting a set of files.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub ingested: Vec<(Document, IngestReport)>,
    pub failed: Vec<FailedFile>,
}

impl IngestSummary {
    pub fn total_chunks(&self) -> usize {
        self.ingested.iter().map(|(_, r)| r.chunks).sum()
    }
}

/// Expand `paths` into the supported files they name. Directories are
/// walked recursively; hidden entries are skipped. Explicit file paths are
/// kept even when their type is unknown, so the failure gets reported.
pub fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let walker = WalkDir::new(path)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && content_type_for_path(entry.path()).is_some() {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

/// Stable document ID for a file, so re-ingesting it replaces its chunks.
pub fn document_id_for_path(path: &Path) -> String {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    Uuid::new_v5(&Uuid::NAMESPACE_URL, canonical.to_string_lossy().as_bytes()).to_string()
}

/// Read and extract one file into a pending [`Document`].
pub fn load_document(path: &Path, max_bytes: u64) -> Result<Document, IngestError> {
    let content_type = content_type_for_path(path)
        .ok_or_else(|| IngestError::UnknownExtension(path.to_path_buf()))?;
    let size = std::fs::metadata(path)
        .map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size > max_bytes {
        return Err(ExtractError::TooLarge {
            size,
            limit: max_bytes,
        }
        .into());
    }
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = extract_text(&bytes, content_type, max_bytes)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Document::with_id(
        document_id_for_path(path),
        name,
        content_type,
        text,
    ))
}

/// Ingest every file under `paths`, collecting failures instead of stopping.
pub async fn ingest_paths(
    pipeline: &RagPipeline,
    paths: &[PathBuf],
    max_bytes: u64,
) -> IngestSummary {
    let mut summary = IngestSummary::default();
    for path in collect_files(paths) {
        match ingest_file(pipeline, &path, max_bytes).await {
            Ok(done) => summary.ingested.push(done),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "skipping file");
                summary.failed.push(FailedFile { path, error });
            }
        }
    }
    info!(
        documents = summary.ingested.len(),
        chunks = summary.total_chunks(),
        failed = summary.failed.len(),
        "ingestion finished"
    );
    summary
}

async fn ingest_file(
    pipeline: &RagPipeline,
    path: &Path,
    max_bytes: u64,
) -> Result<(Document, IngestReport), IngestError> {
    let mut document = load_document(path, max_bytes)?;
    let report = pipeline.ingest(&mut document).await?;
    Ok((document, report))
}

/// Ingest an uploaded file held in memory.
pub async fn ingest_bytes(
    pipeline: &RagPipeline,
    name: &str,
    content_type: &str,
    bytes: &[u8],
    max_bytes: u64,
) -> Result<(Document, IngestReport), IngestError> {
    let text = extract_text(bytes, content_type, max_bytes)?;
    let mut document = Document::new(name, content_type, text);
    let report = pipeline.ingest(&mut document).await?;
    Ok((document, report))
}
