//! Best-effort Spotify enrichment for summaries.
//!
//! Enrichment adds release years and a mood to the prompt. It runs as its
//! own task so a slow Spotify never holds up the summary: the caller waits
//! for it only up to a soft timeout and otherwise carries on without it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;

use cadence_upstream::{Mood, SpotifyClient, TokenSource};

use super::request::Track;

/// Span of album release years among the matched tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearRange {
    pub from: u16,
    pub to: u16,
}

/// Secondary data about a track list. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_range: Option<YearRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    /// Tracks found on Spotify.
    pub matched: usize,
}

impl Enrichment {
    /// True when nothing useful was found.
    pub fn is_empty(&self) -> bool {
        self.year_range.is_none() && self.mood.is_none()
    }
}

/// Look up the first `top_n` tracks.
///
/// Never fails; any upstream error just leaves the corresponding field empty.
pub async fn enrich<S: TokenSource>(
    client: &SpotifyClient<S>,
    tracks: &[Track],
    top_n: usize,
) -> Enrichment {
    let lookups = tracks
        .iter()
        .take(top_n)
        .map(|t| client.search_track(&t.name, &t.artist));
    let matches: Vec<_> = join_all(lookups)
        .await
        .into_iter()
        .filter_map(|result| match result {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(error = %e, "Enrichment search failed");
                None
            }
        })
        .collect();

    let mut enrichment = Enrichment {
        matched: matches.len(),
        ..Enrichment::default()
    };

    let years: Vec<u16> = matches.iter().filter_map(|m| m.release_year()).collect();
    if let (Some(&from), Some(&to)) = (years.iter().min(), years.iter().max()) {
        enrichment.year_range = Some(YearRange { from, to });
    }

    let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
    match client.audio_features(&ids).await {
        Ok(features) if !features.is_empty() => {
            let n = features.len() as f64;
            enrichment.valence = Some(features.iter().map(|f| f.valence).sum::<f64>() / n);
            enrichment.energy = Some(features.iter().map(|f| f.energy).sum::<f64>() / n);
            enrichment.mood = Mood::from_features(&features);
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "Audio features unavailable"),
    }

    enrichment
}

/// Start enrichment in the background.
pub fn spawn_enrichment<S>(
    client: Arc<SpotifyClient<S>>,
    tracks: Vec<Track>,
    top_n: usize,
) -> JoinHandle<Enrichment>
where
    S: TokenSource + 'static,
{
    tokio::spawn(async move { enrich(&client, &tracks, top_n).await })
}

/// Outcome of waiting for enrichment under a soft timeout.
#[derive(Debug)]
pub enum SoftJoin {
    /// Finished in time.
    Ready(Enrichment),
    /// Still running; the handle can be checked again later.
    Pending(JoinHandle<Enrichment>),
    /// The task died.
    Failed,
}

/// Wait up to `timeout` for enrichment.
pub async fn wait_soft(mut handle: JoinHandle<Enrichment>, timeout: Duration) -> SoftJoin {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(enrichment)) => SoftJoin::Ready(enrichment),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Enrichment task failed");
            SoftJoin::Failed
        }
        Err(_) => {
            tracing::debug!(timeout_ms = timeout.as_millis() as u64, "Enrichment not ready");
            SoftJoin::Pending(handle)
        }
    }
}

/// Take the result of an enrichment task that has already finished.
///
/// An unfinished task is aborted.
pub async fn take_if_finished(handle: JoinHandle<Enrichment>) -> Option<Enrichment> {
    if !handle.is_finished() {
        handle.abort();
        return None;
    }
    handle.await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Enrichment {
        Enrichment {
            year_range: Some(YearRange { from: 1994, to: 1998 }),
            mood: Some(Mood::MelancholicCalm),
            valence: Some(0.2),
            energy: Some(0.3),
            matched: 2,
        }
    }

    #[test]
    fn test_serializes_camel_case_and_skips_empty() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["yearRange"]["from"], 1994);
        assert_eq!(json["mood"], "melancholic-calm");

        let empty = serde_json::to_value(Enrichment::default()).unwrap();
        assert_eq!(empty, serde_json::json!({"matched": 0}));
        assert!(Enrichment::default().is_empty());
    }

    #[tokio::test]
    async fn test_wait_soft_returns_ready_result() {
        let handle = tokio::spawn(async { sample() });
        match wait_soft(handle, Duration::from_millis(500)).await {
            SoftJoin::Ready(got) => assert_eq!(got, sample()),
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_soft_gives_up_without_consuming_handle() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            sample()
        });

        let started = tokio::time::Instant::now();
        let SoftJoin::Pending(handle) = wait_soft(handle, Duration::from_millis(800)).await else {
            panic!("expected pending");
        };
        assert!(started.elapsed() < Duration::from_secs(1));

        // The task keeps running and can still be collected later.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(take_if_finished(handle).await, Some(sample()));
    }

    #[tokio::test]
    async fn test_wait_soft_reports_panicked_task() {
        fn blow_up() -> Enrichment {
            panic!("lookup blew up")
        }
        let handle = tokio::spawn(async { blow_up() });
        assert!(matches!(
            wait_soft(handle, Duration::from_millis(500)).await,
            SoftJoin::Failed
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_if_finished_skips_running_task() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            sample()
        });
        tokio::task::yield_now().await;
        assert_eq!(take_if_finished(handle).await, None);
    }
}
