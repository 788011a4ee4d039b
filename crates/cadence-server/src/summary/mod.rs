//! AI summaries of a listening session.
//!
//! A summary request goes through these steps:
//!
//! 1. Validate the track list and derive the content-addressed cache key.
//! 2. On a cache hit, replay the stored text. No model is called.
//! 3. On a miss, start Spotify enrichment in the background and give it a
//!    short head start.
//! 4. Walk the model list until one model accepts the prompt.
//! 5. Tee the model stream to the client and to the summary store.

pub mod enrich;
pub mod key;
pub mod prompt;
pub mod request;
pub mod tee;

pub use enrich::{Enrichment, SoftJoin, YearRange};
pub use key::cache_key;
pub use request::{Mode, SummaryInput, SummaryRequest, Track};
pub use tee::SummaryFrame;

use tokio::sync::mpsc;

use cadence_llm::CompletionRequest;

use crate::error::{Result, ServerError};
use crate::state::AppState;
use tee::{CacheTarget, Extras, FRAME_BUFFER};

/// Whether a summary came from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    /// Value of the `X-Cache` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A summary ready to stream.
#[derive(Debug)]
pub struct SummaryStream {
    pub cache: CacheStatus,
    /// Model that produced (or is producing) the text.
    pub model: String,
    pub frames: mpsc::Receiver<SummaryFrame>,
}

/// Produce a summary for a validated request.
///
/// Fails before any network call when no backend is configured. After the
/// stream has been handed back, failures are reported in-band.
pub async fn summarize(state: &AppState, input: SummaryInput) -> Result<SummaryStream> {
    let backend = state
        .llm
        .clone()
        .ok_or_else(|| ServerError::Config("GROQ_API_KEY is not set".to_string()))?;
    let settings = &state.config.summary;

    let key = cache_key(&input.tracks, input.mode);
    match state.summaries.get(&key).await {
        Ok(Some(cached)) => {
            tracing::info!(key = %key, model = %cached.model, "Summary cache hit");
            return Ok(replay(cached.text, cached.model));
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(key = %key, error = %e, "Summary store read failed, treating as miss"),
    }

    let mut extras = Extras::default();
    if let Some(spotify) = state.spotify.clone() {
        let handle = enrich::spawn_enrichment(spotify, input.tracks.clone(), settings.enrich_top_n);
        match enrich::wait_soft(handle, settings.enrich_timeout).await {
            SoftJoin::Ready(enrichment) if !enrichment.is_empty() => {
                extras.leading = Some(enrichment)
            }
            SoftJoin::Pending(handle) => extras.pending = Some(handle),
            SoftJoin::Ready(_) | SoftJoin::Failed => {}
        }
    }

    let messages = prompt::build_messages(&input, extras.leading.as_ref());
    let first_model = state.chain.models().first().cloned().unwrap_or_default();
    let request = CompletionRequest::new(first_model, messages, settings.max_tokens)
        .with_temperature(settings.temperature);

    let (model, stream) = match state.chain.stream(backend.as_ref(), &request).await {
        Ok(opened) => opened,
        Err(e) => {
            if let Some(handle) = extras.pending.take() {
                handle.abort();
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        key = %key,
        model = %model,
        tracks = input.tracks.len(),
        mode = input.mode.as_str(),
        enriched = extras.leading.is_some(),
        "Summary cache miss, streaming"
    );

    let target = CacheTarget {
        store: state.summaries.clone(),
        key,
        model: model.clone(),
        ttl: settings.cache_ttl,
    };
    let frames = tee::spawn_pump(stream, target, extras);

    Ok(SummaryStream {
        cache: CacheStatus::Miss,
        model,
        frames,
    })
}

fn replay(text: String, model: String) -> SummaryStream {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    // Two frames always fit in a fresh channel.
    let _ = tx.try_send(SummaryFrame::Text(text));
    let _ = tx.try_send(SummaryFrame::Done);
    SummaryStream {
        cache: CacheStatus::Hit,
        model,
        frames: rx,
    }
}
