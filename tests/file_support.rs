//! Integration tests for file extraction and directory ingestion.
//!
//! Asserts: DOCX paragraphs are extracted, directories are walked with hidden
//! and unsupported files skipped, one bad file does not stop the rest, and
//! re-ingesting a path replaces rather than duplicates its chunks.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use docqa::extract::{extract_text, ExtractError, MIME_DOCX};
use docqa::ingest::{self, collect_files, document_id_for_path, IngestError};
use docqa_core::config::{GenerationParams, PipelineConfig};
use docqa_core::error::GenerationError;
use docqa_core::generation::{FragmentStream, GenerationBackend};
use docqa_core::models::DocumentStatus;
use docqa_core::pipeline::RagPipeline;
use futures::stream::{self, StreamExt};
use tempfile::TempDir;

const LIMIT: u64 = 1024 * 1024;

struct CannedBackend;

#[async_trait]
impl GenerationBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _: &str, _: &GenerationParams) -> Result<String, GenerationError> {
        Ok("canned answer".to_string())
    }

    async fn stream(
        &self,
        _: &str,
        _: &GenerationParams,
    ) -> Result<FragmentStream, GenerationError> {
        Ok(stream::iter(vec![Ok::<_, GenerationError>("canned answer".to_string())]).boxed())
    }

    async fn test_connection(&self, _: &GenerationParams) -> Result<bool, GenerationError> {
        Ok(true)
    }
}

fn pipeline() -> RagPipeline {
    RagPipeline::new(PipelineConfig::default(), Arc::new(CannedBackend)).unwrap()
}

/// Minimal docx (ZIP) with one `<w:p>` per paragraph.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
            body
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

fn write(dir: &Path, name: &str, bytes: &[u8]) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

#[test]
fn docx_paragraphs_are_extracted() {
    let bytes = minimal_docx(&["Rayleigh scattering", "makes the sky blue"]);
    let text = extract_text(&bytes, MIME_DOCX, LIMIT).unwrap();
    assert_eq!(text, "Rayleigh scattering\n\nmakes the sky blue");
}

#[test]
fn docx_without_document_xml_is_rejected() {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<x/>").unwrap();
        zip.finish().unwrap();
    }
    let err = extract_text(&buf, MIME_DOCX, LIMIT).unwrap_err();
    assert!(matches!(err, ExtractError::Docx(_)));
}

#[test]
fn collect_files_skips_hidden_and_unsupported() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "b.txt", b"bee");
    write(tmp.path(), "a.md", b"# a");
    write(tmp.path(), "nested/c.docx", &minimal_docx(&["see"]));
    write(tmp.path(), ".hidden/d.txt", b"hidden");
    write(tmp.path(), ".e.txt", b"hidden");
    write(tmp.path(), "image.png", b"\x89PNG");

    let files = collect_files(&[tmp.path().to_path_buf()]);
    let names: Vec<String> = files
        .iter()
        .map(|p| p.strip_prefix(tmp.path()).unwrap().to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(names, vec!["a.md", "b.txt", "nested/c.docx"]);
}

#[tokio::test]
async fn bad_files_are_reported_and_others_ingested() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "sky.txt", b"The sky is blue because of Rayleigh scattering.");
    write(tmp.path(), "grass.docx", &minimal_docx(&["Grass is green because of chlorophyll."]));
    write(tmp.path(), "broken.docx", b"not a zip archive");
    write(tmp.path(), "blank.txt", b"   \n  ");

    let pipeline = pipeline();
    let summary = ingest::ingest_paths(&pipeline, &[tmp.path().to_path_buf()], LIMIT).await;

    let ingested: Vec<&str> = summary.ingested.iter().map(|(d, _)| d.name.as_str()).collect();
    assert_eq!(ingested, vec!["grass.docx", "sky.txt"]);
    for (doc, report) in &summary.ingested {
        assert_eq!(doc.status, DocumentStatus::Ready { chunks: report.chunks });
    }

    assert_eq!(summary.failed.len(), 2);
    assert!(summary
        .failed
        .iter()
        .any(|f| f.path.ends_with("broken.docx")
            && matches!(f.error, IngestError::Extract(ExtractError::Docx(_)))));
    assert!(summary
        .failed
        .iter()
        .any(|f| f.path.ends_with("blank.txt")
            && matches!(f.error, IngestError::Extract(ExtractError::NoText))));

    let stats = pipeline.stats().await.unwrap();
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.total_chunks, summary.total_chunks());

    let result = pipeline.query("Why is the sky blue?").await.unwrap();
    assert_eq!(result.answer, "canned answer");
    assert_eq!(result.sources.first().map(String::as_str), Some("sky.txt"));
}

#[tokio::test]
async fn explicit_unknown_file_is_reported() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "data.bin", b"\x00\x01");
    let path = tmp.path().join("data.bin");

    let summary = ingest::ingest_paths(&pipeline(), &[path.clone()], LIMIT).await;
    assert!(summary.ingested.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert!(matches!(summary.failed[0].error, IngestError::UnknownExtension(_)));
}

#[tokio::test]
async fn oversized_file_is_rejected_before_reading() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "big.txt", &vec![b'a'; 4096]);

    let err = ingest::load_document(&tmp.path().join("big.txt"), 1024).unwrap_err();
    assert!(matches!(
        err,
        IngestError::Extract(ExtractError::TooLarge { size: 4096, limit: 1024 })
    ));
}

#[tokio::test]
async fn reingesting_a_path_replaces_its_chunks() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("notes.txt");
    fs::write(&path, "The sky is blue on a clear day.").unwrap();

    let pipeline = pipeline();
    let first = ingest::ingest_paths(&pipeline, &[path.clone()], LIMIT).await;
    let second = ingest::ingest_paths(&pipeline, &[path.clone()], LIMIT).await;

    let (doc1, _) = &first.ingested[0];
    let (doc2, report) = &second.ingested[0];
    assert_eq!(doc1.id, doc2.id);
    assert_eq!(doc1.id, document_id_for_path(&path));
    assert_eq!(report.inserted, 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(pipeline.stats().await.unwrap().total_chunks, 1);
}
