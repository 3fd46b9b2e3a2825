//! Generation backend for OpenAI-compatible chat-completions APIs.
//!
//! Works against the hosted OpenAI API and local runtimes that mimic it
//! (Ollama, llama.cpp server, vLLM). Streaming uses Server-Sent Events:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"The "}}]}
//! data: {"choices":[{"delta":{"content":"sky"}}]}
//! data: [DONE]
//! ```
//!
//! The response body is read only as fast as fragments are pulled, so a
//! consumer that stops early stops the download too. No request is retried.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::config::GenerationParams;
use docqa_core::error::GenerationError;
use docqa_core::generation::{FragmentStream, GenerationBackend};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::BackendConfig;

pub struct OpenAiCompatibleBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, GenerationError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        params: &GenerationParams,
    ) -> Result<reqwest::RequestBuilder, GenerationError> {
        if params.credential.is_empty() {
            if !params.model.is_local() {
                return Err(GenerationError::MissingCredential(self.base_url.clone()));
            }
            return Ok(request);
        }
        Ok(request.header("Authorization", format!("Bearer {}", params.credential)))
    }

    async fn send_chat(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = chat_body(prompt, params, stream);
        let mut request = self
            .client
            .post(self.url("chat/completions"))
            .header("Content-Type", "application/json")
            .json(&body);
        if !stream {
            request = request.timeout(self.timeout);
        }
        let request = self.authorize(request, params)?;

        debug!(model = %params.model, stream, "sending chat completion request");
        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

fn chat_body(prompt: &str, params: &GenerationParams, stream: bool) -> Value {
    json!({
        "model": params.model.as_str(),
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "stream": stream,
    })
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let response = self.send_chat(prompt, params, false).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        parse_completion(&json)
    }

    async fn stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<FragmentStream, GenerationError> {
        let response = self.send_chat(prompt, params, true).await?;
        Ok(sse_fragments(response.bytes_stream()))
    }

    async fn test_connection(&self, params: &GenerationParams) -> Result<bool, GenerationError> {
        let request = self.client.get(self.url("models")).timeout(self.timeout);
        let response = self
            .authorize(request, params)?
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;
        debug!(status = %response.status(), "backend probe answered");
        Ok(response.status().is_success())
    }
}

/// Extract `choices[0].message.content` from a non-streaming response.
fn parse_completion(json: &Value) -> Result<String, GenerationError> {
    if let Some(message) = error_message(json) {
        return Err(GenerationError::Request(message));
    }
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(content.to_string())
}

fn error_message(json: &Value) -> Option<String> {
    json.get("error").map(|e| {
        e.get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string())
    })
}

// ============ Server-Sent Events ============

/// Incremental `data:` line parser.
#[derive(Default)]
struct SseParser {
    buffer: Vec<u8>,
    done: bool,
}

impl SseParser {
    /// Feed raw bytes; returns the fragments completed by them.
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, GenerationError> {
        self.buffer.extend_from_slice(bytes);
        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.line(&line, &mut fragments)?;
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        Ok(fragments)
    }

    /// Treat whatever is buffered as a final line.
    fn finish(&mut self) -> Result<Vec<String>, GenerationError> {
        let mut fragments = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.line(&line, &mut fragments)?;
        }
        self.done = true;
        Ok(fragments)
    }

    fn line(&mut self, raw: &[u8], out: &mut Vec<String>) -> Result<(), GenerationError> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else {
            // comments, `event:` and `id:` fields, blank separators
            return Ok(());
        };
        let payload = payload.trim();
        if payload == "[DONE]" {
            self.done = true;
            return Ok(());
        }
        let json: Value = serde_json::from_str(payload)
            .map_err(|e| GenerationError::Stream(format!("malformed event: {}", e)))?;
        if let Some(message) = error_message(&json) {
            return Err(GenerationError::Stream(message));
        }
        if let Some(text) = json
            .pointer("/choices/0/delta/content")
            .and_then(|c| c.as_str())
        {
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        Ok(())
    }
}

struct SseState<E> {
    source: BoxStream<'static, Result<Vec<u8>, E>>,
    parser: SseParser,
    pending: VecDeque<String>,
    failed: bool,
}

/// Turn an SSE byte stream into answer fragments, reading the source only
/// when no parsed fragment is waiting.
pub fn sse_fragments<S, B, E>(source: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        source: source.map(|r| r.map(|b| b.as_ref().to_vec())).boxed(),
        parser: SseParser::default(),
        pending: VecDeque::new(),
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.failed || state.parser.done {
                return None;
            }
            let parsed = match state.source.next().await {
                Some(Ok(bytes)) => state.parser.push(&bytes),
                Some(Err(e)) => Err(GenerationError::Stream(e.to_string())),
                None => state.parser.finish(),
            };
            match parsed {
                Ok(fragments) => state.pending.extend(fragments),
                Err(e) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::config::Model;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        let owned: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    fn params(model: Model, credential: &str) -> GenerationParams {
        GenerationParams {
            model,
            temperature: 0.7,
            max_tokens: 100,
            credential: credential.to_string(),
        }
    }

    #[tokio::test]
    async fn sse_fragments_split_across_reads() {
        let source = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"The \"}}]}\n\ndata: {\"cho",
            "ices\":[{\"delta\":{\"content\":\"sky\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]);
        let fragments: Vec<String> = sse_fragments(source)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["The ", "sky"]);
    }

    #[tokio::test]
    async fn sse_final_line_without_newline() {
        let source = chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}"]);
        let fragments: Vec<String> = sse_fragments(source)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["end"]);
    }

    #[tokio::test]
    async fn sse_error_event_ends_stream() {
        let source = chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "data: {\"error\":{\"message\":\"quota exceeded\"}}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
        ]);
        let items: Vec<Result<String, GenerationError>> = sse_fragments(source).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref(), Ok("ok"));
        assert_eq!(
            items[1],
            Err(GenerationError::Stream("quota exceeded".to_string()))
        );
    }

    #[tokio::test]
    async fn sse_malformed_json_is_an_error() {
        let items: Vec<Result<String, GenerationError>> =
            sse_fragments(chunks(&["data: {not json\n"])).collect().await;
        assert!(matches!(items[0], Err(GenerationError::Stream(_))));
    }

    #[test]
    fn completion_parsing() {
        let ok = json!({"choices": [{"message": {"content": "Blue."}}]});
        assert_eq!(parse_completion(&ok).unwrap(), "Blue.");

        let empty = json!({"choices": [{"message": {"content": "  "}}]});
        assert_eq!(parse_completion(&empty), Err(GenerationError::EmptyResponse));

        let err = json!({"error": {"message": "bad key"}});
        assert_eq!(
            parse_completion(&err),
            Err(GenerationError::Request("bad key".to_string()))
        );
    }

    #[test]
    fn chat_body_carries_params() {
        let body = chat_body("hi", &params(Model::Gpt4o, "k"), true);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn hosted_model_without_credential_fails_before_network() {
        let backend = OpenAiCompatibleBackend::new(&BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
        })
        .unwrap();
        let err = backend
            .generate("hi", &params(Model::Gpt4oMini, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingCredential(_)));
    }
}
