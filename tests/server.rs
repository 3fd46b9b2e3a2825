//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::Engine;
use docqa::server::{router, AppState};
use docqa_core::config::{GenerationParams, PipelineConfig};
use docqa_core::error::GenerationError;
use docqa_core::generation::{FragmentStream, GenerationBackend};
use docqa_core::pipeline::RagPipeline;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use tower::ServiceExt;

struct CannedBackend;

#[async_trait]
impl GenerationBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _: &str, _: &GenerationParams) -> Result<String, GenerationError> {
        Ok("It is blue.".to_string())
    }

    async fn stream(
        &self,
        _: &str,
        _: &GenerationParams,
    ) -> Result<FragmentStream, GenerationError> {
        let parts = ["It ", "is ", "blue."].map(|s| Ok::<_, GenerationError>(s.to_string()));
        Ok(stream::iter(parts).boxed())
    }

    async fn test_connection(&self, _: &GenerationParams) -> Result<bool, GenerationError> {
        Ok(true)
    }
}

fn app() -> Router {
    let config = PipelineConfig {
        credential: "sk-secret".to_string(),
        ..PipelineConfig::default()
    };
    let pipeline = RagPipeline::new(config, Arc::new(CannedBackend)).unwrap();
    router(AppState::new(pipeline, 1024 * 1024))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn upload_body(name: &str, text: &str) -> Value {
    json!({
        "name": name,
        "data": base64::engine::general_purpose::STANDARD.encode(text),
    })
}

#[tokio::test]
async fn health_reports_version() {
    let (status, body) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn upload_then_query_then_history() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/documents",
        Some(upload_body("sky.txt", "The sky is blue on a clear day.")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["document"]["name"], "sky.txt");
    assert_eq!(body["document"]["raw_text"], "");
    assert_eq!(body["report"]["chunks"], 1);

    let (status, body) = send(&app, Method::GET, "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_chunks"], 1);
    assert_eq!(body["total_documents"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/query",
        Some(json!({ "question": "What color is the sky?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "It is blue.");
    assert_eq!(body["sources"], json!(["sky.txt"]));

    let (_, body) = send(&app, Method::GET, "/history", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["question"], "What color is the sky?");

    let (status, _) = send(&app, Method::DELETE, "/history", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/history", None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn upload_errors_map_to_status_codes() {
    let app = app();

    let upload = upload_body("x.bin", "abc");
    let (status, body) = send(&app, Method::POST, "/documents", Some(upload)).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["code"], "unsupported_type");

    let bad = json!({ "name": "a.txt", "data": "***" });
    let (status, body) = send(&app, Method::POST, "/documents", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let upload = upload_body("a.txt", "  \n ");
    let (status, body) = send(&app, Method::POST, "/documents", Some(upload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "unprocessable");
}

#[tokio::test]
async fn blank_question_is_bad_request() {
    let question = json!({ "question": "   " });
    let (status, body) = send(&app(), Method::POST, "/query", Some(question)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn config_is_redacted_and_patched_atomically() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credential"], "********");

    let patch = json!({ "temperature": 2.0, "chunk_size": 50, "top_k": 9 });
    let (status, body) = send(&app, Method::PATCH, "/config", Some(patch)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_config");
    let fields = body["error"]["fields"].as_array().unwrap();
    assert!(fields.contains(&json!("temperature")));
    assert!(fields.contains(&json!("chunk_size")));

    let (_, body) = send(&app, Method::GET, "/config", None).await;
    assert_eq!(body["top_k"], 4);

    let (status, body) = send(&app, Method::PATCH, "/config", Some(json!({ "top_k": 2 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_k"], 2);
    assert_eq!(body["credential"], "********");
}

#[tokio::test]
async fn deleting_unknown_document_is_not_found() {
    let (status, body) = send(&app(), Method::DELETE, "/documents/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn clear_knowledge_base_empties_store() {
    let app = app();
    send(&app, Method::POST, "/documents", Some(upload_body("sky.txt", "The sky is blue."))).await;

    let (status, _) = send(&app, Method::DELETE, "/knowledge-base", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/stats", None).await;
    assert_eq!(body["total_chunks"], 0);
}

#[tokio::test]
async fn probe_reports_ok() {
    let (status, body) = send(&app(), Method::POST, "/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn stream_emits_server_sent_events() {
    let app = app();
    let upload = upload_body("sky.txt", "The sky is blue on a clear day.");
    send(&app, Method::POST, "/documents", Some(upload)).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/query/stream")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "question": "What color is the sky?" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let searching = text.find("event: searching").unwrap();
    let found = text.find("event: found").unwrap();
    let fragment = text.find("event: fragment").unwrap();
    let complete = text.find("event: complete").unwrap();
    assert!(searching < found && found < fragment && fragment < complete);
    assert!(text.contains("It is blue."));

    let (_, body) = send(&app, Method::GET, "/history", None).await;
    assert_eq!(body[0]["answer"], "It is blue.");
}
