//! LLM Backend trait and implementations.
//!
//! This module defines the abstraction over chat-completion providers and a
//! scripted mock for tests.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{LlmError, Result};
use crate::types::{CompletionRequest, StopReason};

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Types
// ─────────────────────────────────────────────────────────────────────────────

/// A streaming response from an LLM backend.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// Events emitted during streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Message started.
    MessageStart { id: String, model: String },
    /// A chunk of generated text.
    TextDelta(String),
    /// Message complete.
    MessageStop { stop_reason: StopReason },
    /// Error reported in-band by the provider.
    Error { message: String },
}

/// Drain a stream into its concatenated text.
///
/// An in-band error event is returned as [`LlmError::Backend`].
pub async fn collect_text(mut stream: ResponseStream) -> Result<String> {
    let mut text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::TextDelta(delta) => text.push_str(&delta),
            StreamEvent::Error { message } => return Err(LlmError::Backend(message)),
            StreamEvent::MessageStop { .. } => break,
            StreamEvent::MessageStart { .. } => {}
        }
    }
    Ok(text)
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for chat-completion providers.
///
/// `complete_stream` must surface HTTP-level failures (auth, rate limit, 5xx)
/// as an `Err` before the stream is returned, so that callers can fall back
/// to another model without having sent anything to their own client.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return a stream of events.
    async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream>;

    /// Get the name of this backend.
    fn name(&self) -> &str;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBackend, MockOutcome};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use crate::error::RateLimitInfo;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    /// What the mock does when asked to run a given model.
    #[derive(Debug, Clone)]
    pub enum MockOutcome {
        /// Stream this text, split on whitespace into several deltas.
        Text(String),
        /// Fail with a 429.
        RateLimit,
        /// Fail with the given 5xx status.
        ServerError(u16),
        /// Fail with a 401.
        Auth,
        /// Fail with a connection error.
        Network,
        /// Start streaming this text, then fail mid-stream.
        StreamErrorAfter(String),
    }

    /// A mock backend with per-model scripted outcomes.
    ///
    /// Models without a scripted outcome stream the default text.
    pub struct MockBackend {
        name: String,
        default_text: String,
        outcomes: Mutex<HashMap<String, MockOutcome>>,
        chunk_delay: Option<Duration>,
        request_log: Mutex<Vec<CompletionRequest>>,
    }

    impl MockBackend {
        /// Create a mock that answers every model with `text`.
        pub fn with_text(text: impl Into<String>) -> Self {
            Self {
                name: "mock".to_string(),
                default_text: text.into(),
                outcomes: Mutex::new(HashMap::new()),
                chunk_delay: None,
                request_log: Mutex::new(Vec::new()),
            }
        }

        /// Script the outcome for one model.
        pub fn with_outcome(self, model: impl Into<String>, outcome: MockOutcome) -> Self {
            self.outcomes.lock().insert(model.into(), outcome);
            self
        }

        /// Sleep between streamed deltas.
        pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
            self.chunk_delay = Some(delay);
            self
        }

        /// Get all requests that were made to this backend.
        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.request_log.lock().clone()
        }

        /// Get the number of requests made.
        pub fn request_count(&self) -> usize {
            self.request_log.lock().len()
        }

        /// Models requested, in call order.
        pub fn models_called(&self) -> Vec<String> {
            self.request_log
                .lock()
                .iter()
                .map(|r| r.model.clone())
                .collect()
        }

        fn outcome_for(&self, request: &CompletionRequest) -> MockOutcome {
            self.request_log.lock().push(request.clone());
            self.outcomes
                .lock()
                .get(&request.model)
                .cloned()
                .unwrap_or_else(|| MockOutcome::Text(self.default_text.clone()))
        }
    }

    fn chunks(text: &str) -> Vec<String> {
        text.split_inclusive(' ').map(str::to_string).collect()
    }

    fn fail(outcome: &MockOutcome) -> Option<LlmError> {
        match outcome {
            MockOutcome::RateLimit => Some(LlmError::RateLimit(RateLimitInfo::parse_groq(
                "Rate limit reached. Please try again in 1s.",
                None,
            ))),
            MockOutcome::ServerError(status) => Some(LlmError::Server {
                status: *status,
                message: "mock server error".to_string(),
            }),
            MockOutcome::Auth => Some(LlmError::Auth("Invalid API key".to_string())),
            MockOutcome::Network => Some(LlmError::Network("Connection refused".to_string())),
            MockOutcome::Text(_) | MockOutcome::StreamErrorAfter(_) => None,
        }
    }

    #[async_trait]
    impl LlmBackend for MockBackend {
        async fn complete_stream(&self, request: CompletionRequest) -> Result<ResponseStream> {
            let outcome = self.outcome_for(&request);
            if let Some(err) = fail(&outcome) {
                return Err(err);
            }

            let (text, interrupted) = match outcome {
                MockOutcome::Text(text) => (text, false),
                MockOutcome::StreamErrorAfter(text) => (text, true),
                _ => unreachable!("failing outcomes returned above"),
            };

            let mut events: Vec<Result<StreamEvent>> = vec![Ok(StreamEvent::MessageStart {
                id: "mock_msg".to_string(),
                model: request.model.clone(),
            })];
            events.extend(chunks(&text).into_iter().map(|c| Ok(StreamEvent::TextDelta(c))));
            if interrupted {
                events.push(Err(LlmError::Network("stream reset".to_string())));
            } else {
                events.push(Ok(StreamEvent::MessageStop {
                    stop_reason: StopReason::EndTurn,
                }));
            }

            let delay = self.chunk_delay;
            let stream = futures::stream::iter(events).then(move |event| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                event
            });
            Ok(Box::pin(stream))
        }

        fn name(&self) -> &str {
            &self.name
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
