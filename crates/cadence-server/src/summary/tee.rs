//! Stream tee: one upstream stream, two consumers.
//!
//! A pump task drains the model stream, forwarding each delta to the client
//! through a bounded channel while accumulating the full text. When the
//! upstream finishes cleanly the text is written to the summary store. The
//! pump never stops early because the client went away, so a summary that
//! was paid for is always cached.

use std::time::Duration;

use axum::response::sse::Event;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use cadence_llm::{ResponseStream, StreamEvent};

use super::enrich::{Enrichment, take_if_finished};
use crate::cache::{CachedSummary, SharedStore};

/// Frames buffered between the pump and a slow client.
pub const FRAME_BUFFER: usize = 32;

/// One frame of the summary event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryFrame {
    /// Enrichment data, sent as `event: meta`.
    Meta(Enrichment),
    /// A text delta.
    Text(String),
    /// The upstream failed mid-stream.
    Error(String),
    /// End of stream, sent as `data: [DONE]`.
    Done,
}

#[derive(Serialize)]
struct TextData<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ErrorData<'a> {
    message: &'a str,
}

impl SummaryFrame {
    /// Render as an SSE event.
    pub fn to_event(&self) -> Event {
        match self {
            SummaryFrame::Meta(enrichment) => Event::default()
                .event("meta")
                .json_data(enrichment)
                .unwrap_or_else(|_| Event::default()),
            SummaryFrame::Text(text) => Event::default()
                .json_data(TextData { text })
                .unwrap_or_else(|_| Event::default()),
            SummaryFrame::Error(message) => Event::default()
                .event("error")
                .json_data(ErrorData { message })
                .unwrap_or_else(|_| Event::default()),
            SummaryFrame::Done => Event::default().data("[DONE]"),
        }
    }
}

/// Where a finished summary is written.
#[derive(Clone)]
pub struct CacheTarget {
    pub store: SharedStore,
    pub key: String,
    pub model: String,
    pub ttl: Duration,
}

/// What the pump starts with besides the model stream.
#[derive(Default)]
pub struct Extras {
    /// Enrichment that was ready before the model was called.
    pub leading: Option<Enrichment>,
    /// Enrichment still running; patched in at the end if it finished.
    pub pending: Option<JoinHandle<Enrichment>>,
}

struct Sink {
    tx: mpsc::Sender<SummaryFrame>,
    open: bool,
}

impl Sink {
    async fn send(&mut self, frame: SummaryFrame) {
        if self.open && self.tx.send(frame).await.is_err() {
            self.open = false;
            tracing::debug!("Client disconnected, draining upstream for cache");
        }
    }
}

/// Spawn the pump and return the client side of the tee.
pub fn spawn_pump(
    stream: ResponseStream,
    target: CacheTarget,
    extras: Extras,
) -> mpsc::Receiver<SummaryFrame> {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(pump(stream, target, extras, Sink { tx, open: true }));
    rx
}

async fn pump(mut stream: ResponseStream, target: CacheTarget, extras: Extras, mut sink: Sink) {
    if let Some(enrichment) = extras.leading {
        sink.send(SummaryFrame::Meta(enrichment)).await;
    }

    let mut text = String::new();
    let mut failure = None;
    while let Some(event) = stream.next().await {
        match event {
            Ok(StreamEvent::TextDelta(delta)) => {
                text.push_str(&delta);
                sink.send(SummaryFrame::Text(delta)).await;
            }
            Ok(StreamEvent::MessageStop { .. }) => break,
            Ok(StreamEvent::MessageStart { .. }) => {}
            Ok(StreamEvent::Error { message }) => {
                failure = Some(message);
                break;
            }
            Err(e) => {
                failure = Some(e.to_string());
                break;
            }
        }
    }

    match failure {
        Some(message) => {
            tracing::warn!(model = %target.model, error = %message, "Summary stream failed, not caching");
            sink.send(SummaryFrame::Error(message)).await;
        }
        None if text.trim().is_empty() => {
            tracing::warn!(model = %target.model, "Summary was empty, not caching");
        }
        None => {
            let summary = CachedSummary::new(text, target.model.clone());
            match target.store.put(&target.key, summary, target.ttl).await {
                Ok(()) => tracing::debug!(
                    key = %target.key,
                    model = %target.model,
                    store = target.store.name(),
                    "Summary cached"
                ),
                Err(e) => tracing::warn!(key = %target.key, error = %e, "Failed to cache summary"),
            }
        }
    }

    if let Some(handle) = extras.pending
        && let Some(enrichment) = take_if_finished(handle).await
        && !enrichment.is_empty()
    {
        sink.send(SummaryFrame::Meta(enrichment)).await;
    }

    sink.send(SummaryFrame::Done).await;
}
