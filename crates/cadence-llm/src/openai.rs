//! OpenAI-compatible API backend implementation.
//!
//! This module provides `OpenAiBackend` which connects to any service that
//! speaks the OpenAI chat-completions protocol. The summary endpoint uses it
//! with the Groq preset.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, header};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use crate::backend::{LlmBackend, ResponseStream, StreamEvent};
use crate::error::{LlmError, RateLimitInfo, Result};
use crate::types::{CompletionRequest, StopReason};

/// Default Groq API base URL.
pub const DEFAULT_GROQ_BASE: &str = "https://api.groq.com/openai/v1";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token.
    pub api_key: Option<String>,

    /// Base URL for the API.
    pub base_url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Name for this backend instance.
    pub name: String,
}

impl OpenAiConfig {
    /// Create a new config for Groq.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_GROQ_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            name: "groq".to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the backend name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible API backend.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Create a new OpenAI-compatible backend with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    /// Add authentication headers to a request.
    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");

        if let Some(ref api_key) = self.config.api_key {
            builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key))
        } else {
            builder
        }
    }

    fn to_openai_request(request: &CompletionRequest) -> OpenAiChatRequest {
        OpenAiChatRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: m.role.as_str(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            stream: request.stream,
        }
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Response> {
        let body = Self::to_openai_request(request);

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = body.messages.len(),
            stream = body.stream,
            "Sending OpenAI-compatible request"
        );

        let response = self
            .add_headers(self.client.post(self.completions_url()))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error_response(response).await);
        }
        Ok(response)
    }

    /// Map a non-success response onto the error taxonomy.
    ///
    /// 401/403 are auth failures, 429 a rate limit, 5xx a server error and
    /// any other 4xx an invalid request (unknown model, bad parameters).
    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::RateLimit(RateLimitInfo::parse_groq(&message, retry_after.as_deref())),
            500..=599 => LlmError::Server {
                status: status.as_u16(),
                message,
            },
            400..=499 => LlmError::InvalidRequest(message),
            _ => LlmError::Backend(message),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
        let mut request = request;
        request.stream = true;

        let response = self.send(&request).await?;
        Ok(parse_openai_sse_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, serde::Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiError {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Turn an SSE byte stream into [`StreamEvent`]s.
///
/// A body that ends without `[DONE]` or a finish reason yields a trailing
/// network error, so truncated text is never mistaken for a complete answer.
fn parse_openai_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> ResponseStream {
    Box::pin(futures::stream::unfold(
        OpenAiSseState {
            byte_stream: Box::pin(byte_stream),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            done: false,
            started: false,
            stop_reason: None,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.done {
                    return None;
                }

                // Decode only complete lines so a character split across
                // reads is reassembled first
                if let Some(line_end) = state.buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = state.buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    state.handle_line(&line);
                    continue;
                }

                // Need more data
                match state.byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        state.buffer.extend_from_slice(&bytes);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(LlmError::from(e)), state));
                    }
                    None => {
                        let trailing = String::from_utf8_lossy(&state.buffer).trim().to_string();
                        state.buffer.clear();
                        if !trailing.is_empty() {
                            state.handle_line(&trailing);
                        }
                        if !state.done {
                            state.done = true;
                            let event = match state.stop_reason {
                                Some(stop_reason) => Ok(StreamEvent::MessageStop { stop_reason }),
                                None => Err(LlmError::Network(
                                    "Stream ended before completion".to_string(),
                                )),
                            };
                            state.pending.push_back(event);
                        }
                    }
                }
            }
        },
    ))
}

struct OpenAiSseState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamEvent>>,
    done: bool,
    started: bool,
    stop_reason: Option<StopReason>,
}

impl OpenAiSseState {
    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:").map(str::trim) else {
            return;
        };

        if data == "[DONE]" {
            self.done = true;
            self.pending.push_back(Ok(StreamEvent::MessageStop {
                stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            }));
            return;
        }

        if let Ok(err) = serde_json::from_str::<OpenAiErrorResponse>(data) {
            self.done = true;
            self.pending.push_back(Ok(StreamEvent::Error {
                message: err.error.message,
            }));
            return;
        }

        let chunk = match serde_json::from_str::<OpenAiStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable SSE chunk");
                return;
            }
        };

        if !self.started {
            self.started = true;
            self.pending.push_back(Ok(StreamEvent::MessageStart {
                id: chunk.id.clone(),
                model: chunk.model.clone(),
            }));
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.and_then(|d| d.content)
                && !content.is_empty()
            {
                self.pending.push_back(Ok(StreamEvent::TextDelta(content)));
            }
            if let Some(reason) = choice.finish_reason {
                self.stop_reason = Some(StopReason::from_finish_reason(&reason));
            }
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamChunk {
    id: String,
    model: String,
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::collect_text;
    use crate::types::Message;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};

    fn sse_from(chunks: &[&str]) -> ResponseStream {
        let owned: Vec<reqwest::Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        parse_openai_sse_stream(futures::stream::iter(owned))
    }

    fn chunk(content: &str) -> String {
        format!(
            "data: {{\"id\":\"c1\",\"model\":\"llama\",\"choices\":[{{\"delta\":{{\"content\":{}}},\"finish_reason\":null}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    async fn events(stream: ResponseStream) -> Vec<Result<StreamEvent>> {
        stream.collect().await
    }

    #[test]
    fn test_groq_config() {
        let config = OpenAiConfig::groq("gsk-test");
        assert_eq!(config.name, "groq");
        assert_eq!(config.base_url, DEFAULT_GROQ_BASE);
        assert_eq!(config.timeout, Duration::from_secs(60));

        let config = config
            .with_base_url("http://127.0.0.1:9/v1/")
            .with_timeout(Duration::from_secs(5))
            .with_name("local");
        assert_eq!(config.name, "local");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_completions_url() {
        let backend =
            OpenAiBackend::new(OpenAiConfig::groq("k").with_base_url("http://host/v1/")).unwrap();
        assert_eq!(backend.completions_url(), "http://host/v1/chat/completions");
    }

    #[test]
    fn test_to_openai_request() {
        let request = CompletionRequest::new(
            "llama-3.1-8b-instant",
            vec![Message::system("be brief"), Message::user("hi")],
            120,
        )
        .with_temperature(0.7);
        let json = serde_json::to_value(OpenAiBackend::to_openai_request(&request)).unwrap();

        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 120);
        assert_eq!(json["stream"], false);
    }

    #[tokio::test]
    async fn test_sse_stream_text_and_done() {
        let first = chunk("Hello");
        let second = chunk(" world");
        let stream = sse_from(&[&first, &second, "data: [DONE]\n\n"]);

        let events = events(stream).await;
        let events: Vec<StreamEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert!(matches!(&events[0], StreamEvent::MessageStart { model, .. } if model == "llama"));
        assert_eq!(events[1], StreamEvent::TextDelta("Hello".to_string()));
        assert_eq!(events[2], StreamEvent::TextDelta(" world".to_string()));
        assert!(matches!(events[3], StreamEvent::MessageStop { .. }));
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_sse_lines_split_across_chunks() {
        let whole = format!("{}{}data: [DONE]\n", chunk("split"), chunk(" line"));
        let (a, b) = whole.split_at(whole.len() / 2);
        let (b, c) = b.split_at(7);

        let text = collect_text(sse_from(&[a, b, c])).await.unwrap();
        assert_eq!(text, "split line");
    }

    #[tokio::test]
    async fn test_sse_multibyte_char_split_across_chunks() {
        let whole = format!("{}data: [DONE]\n", chunk("Björk"));
        let bytes = whole.into_bytes();
        // 'ö' is two bytes; cut between them
        let cut = bytes.windows(2).position(|w| w == "ö".as_bytes()).unwrap() + 1;
        let parts: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..cut])),
            Ok(Bytes::copy_from_slice(&bytes[cut..])),
        ];

        let text = collect_text(parse_openai_sse_stream(futures::stream::iter(parts)))
            .await
            .unwrap();
        assert_eq!(text, "Björk");
    }

    #[tokio::test]
    async fn test_sse_truncated_stream_is_error() {
        let first = chunk("partial");
        let events = events(sse_from(&[&first])).await;
        assert!(events.last().unwrap().is_err());
    }

    #[tokio::test]
    async fn test_sse_finish_reason_without_done() {
        let finish = "data: {\"id\":\"c1\",\"model\":\"m\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n";
        let first = chunk("ok");
        let text = collect_text(sse_from(&[&first, finish])).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_sse_in_band_error() {
        let first = chunk("half");
        let stream = sse_from(&[&first, "data: {\"error\":{\"message\":\"overloaded\"}}\n"]);
        let err = collect_text(stream).await.unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // HTTP status mapping against a local server
    // ─────────────────────────────────────────────────────────────────────────

    async fn spawn_status_server(status: StatusCode, retry_after: Option<&'static str>) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move {
                let body = Json(serde_json::json!({"error": {"message": "nope, try again in 2s"}}));
                match retry_after {
                    Some(value) => (status, [(header::RETRY_AFTER, value)], body).into_response(),
                    None => (status, body).into_response(),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    async fn stream_error(status: StatusCode, retry_after: Option<&'static str>) -> LlmError {
        let base = spawn_status_server(status, retry_after).await;
        let backend = OpenAiBackend::new(OpenAiConfig::groq("k").with_base_url(base)).unwrap();
        let request = CompletionRequest::new("m", vec![Message::user("hi")], 10);
        backend.complete_stream(request).await.err().unwrap()
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        assert!(matches!(
            stream_error(StatusCode::UNAUTHORIZED, None).await,
            LlmError::Auth(_)
        ));
        assert!(matches!(
            stream_error(StatusCode::SERVICE_UNAVAILABLE, None).await,
            LlmError::Server { status: 503, .. }
        ));
        assert!(matches!(
            stream_error(StatusCode::NOT_FOUND, None).await,
            LlmError::InvalidRequest(_)
        ));

        let err = stream_error(StatusCode::TOO_MANY_REQUESTS, Some("7")).await;
        assert!(matches!(err, LlmError::RateLimit(_)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = OpenAiBackend::new(
            OpenAiConfig::groq("k").with_base_url(format!("http://{}/v1", addr)),
        )
        .unwrap();
        let request = CompletionRequest::new("m", vec![Message::user("hi")], 10);
        let err = backend.complete_stream(request).await.err().unwrap();
        assert!(err.is_fallback_eligible());
    }
}
