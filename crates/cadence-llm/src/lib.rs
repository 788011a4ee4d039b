//! Completion client abstraction for Cadence.
//!
//! Wraps OpenAI-compatible chat completion APIs (Groq in production) behind
//! the [`LlmBackend`] trait and adds [`ModelChain`], an ordered list of model
//! identifiers tried until one accepts the request.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ ModelChain                   │  llama-3.3-70b ─► llama-3.1-8b ─► gemma2-9b
//! │  stream(backend, request)    │  (advance on 429 / 5xx / network)
//! └──────────────┬───────────────┘
//!                ▼
//! ┌──────────────────────────────┐
//! │ LlmBackend trait             │
//! │  - complete_stream() -> SSE  │
//! └──────────────┬───────────────┘
//!                ▼
//!          OpenAiBackend (Groq)
//! ```

pub mod backend;
pub mod chain;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, ResponseStream, SharedBackend, StreamEvent, collect_text};
#[cfg(any(test, feature = "testing"))]
pub use backend::{MockBackend, MockOutcome};
pub use chain::{ModelChain, ModelFailure};
pub use error::{LlmError, RateLimitInfo, Result};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use types::{CompletionRequest, Message, Role, StopReason};
