//! Spotify image lookup.

use axum::{
    Json,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use cadence_upstream::{SpotifyClient, UpstreamError};

use super::DispatchParams;
use crate::config::IMAGE_LOOKUP_MAX_AGE;
use crate::error::{Result, ServerError};
use crate::state::AppState;

/// `{artistImage, artistName?, spotifyUrl?}`
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistImages {
    pub artist_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_url: Option<String>,
}

/// `{albumImage, artistImage, spotifyUrl?, spotifyId?, trackName?, artistName?, albumName?}`
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackImages {
    pub album_image: Option<String>,
    pub artist_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_name: Option<String>,
}

/// Result of a lookup before it becomes a response.
struct Lookup {
    body: serde_json::Value,
    /// False when the search itself failed; such answers are not cached.
    cacheable: bool,
}

/// `GET /?type=spotify&artist=..[&track=..]`
pub async fn lookup(state: &AppState, params: &DispatchParams) -> Result<Response> {
    let artist = non_empty(params.artist.as_deref());
    let track = non_empty(params.track.as_deref());
    let artist = match (artist, track) {
        (Some(artist), _) => artist,
        (None, Some(_)) => {
            return Err(ServerError::BadRequest("Missing artist parameter".to_string()));
        }
        (None, None) => {
            return Err(ServerError::BadRequest(
                "Missing artist or track parameter".to_string(),
            ));
        }
    };

    let client = state.spotify.as_ref().ok_or_else(|| {
        ServerError::Config("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET are not set".to_string())
    })?;

    let key = image_cache_key(artist, track);
    if let Some(body) = state.image_cache.get(&key) {
        tracing::debug!(artist, track, "Image lookup cache hit");
        return Ok(respond(body));
    }

    let found = match track {
        Some(track) => lookup_track(client, artist, track).await?,
        None => lookup_artist(client, artist).await?,
    };
    if found.cacheable {
        state.image_cache.insert(key, found.body.clone());
    }
    Ok(respond(found.body))
}

async fn lookup_artist(client: &SpotifyClient, artist: &str) -> Result<Lookup> {
    let (found, cacheable) = settle(client.search_artist(artist).await)?;
    let body = match found {
        Some(m) => ArtistImages {
            artist_image: m.image,
            artist_name: Some(m.name),
            spotify_url: m.spotify_url,
        },
        None => ArtistImages::default(),
    };
    Ok(Lookup {
        body: to_value(body)?,
        cacheable,
    })
}

async fn lookup_track(client: &SpotifyClient, artist: &str, track: &str) -> Result<Lookup> {
    let (found, cacheable) = settle(client.search_track(track, artist).await)?;
    let Some(m) = found else {
        return Ok(Lookup {
            body: to_value(TrackImages::default())?,
            cacheable,
        });
    };

    let artist_image = match &m.artist_id {
        Some(id) => client.artist_image(id).await.unwrap_or_else(|e| {
            tracing::debug!(artist_id = %id, error = %e, "Artist image unavailable");
            None
        }),
        None => None,
    };

    let body = TrackImages {
        album_image: m.album_image,
        artist_image,
        spotify_url: m.spotify_url,
        spotify_id: Some(m.id),
        track_name: Some(m.name),
        artist_name: m.artist_name,
        album_name: m.album_name,
    };
    Ok(Lookup {
        body: to_value(body)?,
        cacheable,
    })
}

/// Split a search result into "match or no match" and whether to cache it.
///
/// Token failures are terminal; any other upstream failure reads as no match.
fn settle<T>(result: cadence_upstream::Result<Option<T>>) -> Result<(Option<T>, bool)> {
    match result {
        Ok(found) => Ok((found, true)),
        Err(e @ UpstreamError::Token(_)) => Err(e.into()),
        Err(e) => {
            tracing::warn!(error = %e, "Spotify search failed, answering with no match");
            Ok((None, false))
        }
    }
}

fn respond(body: serde_json::Value) -> Response {
    (
        [(
            header::CACHE_CONTROL,
            format!("public, max-age={}", IMAGE_LOOKUP_MAX_AGE),
        )],
        Json(body),
    )
        .into_response()
}

fn to_value(body: impl Serialize) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|e| ServerError::Internal(e.to_string()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Cache key for a lookup, insensitive to case and surrounding whitespace.
pub fn image_cache_key(artist: &str, track: Option<&str>) -> String {
    format!(
        "{}\u{1f}{}",
        artist.trim().to_lowercase(),
        track.unwrap_or("").trim().to_lowercase()
    )
}
