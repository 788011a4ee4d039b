//! Spotify Web API client.
//!
//! Only the handful of catalog endpoints the widget needs: artist and track
//! search, artist lookup and audio features. Every call is authenticated
//! with the process-wide client-credentials token.

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpstreamError};
use crate::token::{ClientCredentials, TokenCache, TokenSource};

/// Default Spotify Web API base URL.
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Default Spotify accounts service URL.
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// Best artist match for a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistMatch {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub spotify_url: Option<String>,
}

/// Best track match for a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMatch {
    pub id: String,
    pub name: String,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub album_image: Option<String>,
    pub release_date: Option<String>,
    pub spotify_url: Option<String>,
}

impl TrackMatch {
    /// Year component of the album release date (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`).
    pub fn release_year(&self) -> Option<u16> {
        self.release_date
            .as_deref()
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }
}

/// Valence and energy for one track, both in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub valence: f64,
    pub energy: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    id: String,
    name: String,
    #[serde(default)]
    images: Vec<Image>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct SimplifiedArtist {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumObject {
    name: String,
    #[serde(default)]
    images: Vec<Image>,
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<SimplifiedArtist>,
    album: Option<AlbumObject>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ArtistSearch {
    artists: Page<ArtistObject>,
}

#[derive(Debug, Deserialize)]
struct TrackSearch {
    tracks: Page<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<AudioFeatures>>,
}

/// Build a `field:"value"` search filter.
///
/// The search syntax has no escape for `"`, so embedded quotes are dropped
/// to keep the phrase closed.
fn field_filter(field: &str, value: &str) -> String {
    let value: String = value.chars().filter(|&c| c != '"').collect();
    format!("{}:\"{}\"", field, value.trim())
}

/// Spotify lists images largest first.
fn first_image(images: Vec<Image>) -> Option<String> {
    images.into_iter().next().map(|i| i.url)
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Spotify catalog client sharing one cached access token.
pub struct SpotifyClient<S = ClientCredentials> {
    http: Client,
    api_url: String,
    tokens: TokenCache<S>,
}

impl SpotifyClient<ClientCredentials> {
    /// Client authenticating with the client-credentials grant.
    pub fn with_credentials(
        http: Client,
        accounts_url: &str,
        api_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let source = ClientCredentials::new(http.clone(), accounts_url, client_id, client_secret);
        Self::new(http, api_url, TokenCache::new(source))
    }
}

impl<S: TokenSource> SpotifyClient<S> {
    pub fn new(http: Client, api_url: &str, tokens: TokenCache<S>) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Token cache used by this client.
    pub fn tokens(&self) -> &TokenCache<S> {
        &self.tokens
    }

    /// Search for the best artist match.
    pub async fn search_artist(&self, artist: &str) -> Result<Option<ArtistMatch>> {
        let q = field_filter("artist", artist);
        let response = self
            .get("/search", &[("q", q.as_str()), ("type", "artist"), ("limit", "1")])
            .await?;
        let search: ArtistSearch = response.json().await?;

        Ok(search.artists.items.into_iter().next().map(|a| ArtistMatch {
            id: a.id,
            name: a.name,
            image: first_image(a.images),
            spotify_url: a.external_urls.spotify,
        }))
    }

    /// Search for the best track match by title and artist.
    pub async fn search_track(&self, track: &str, artist: &str) -> Result<Option<TrackMatch>> {
        let q = format!("{} {}", field_filter("track", track), field_filter("artist", artist));
        let response = self
            .get("/search", &[("q", q.as_str()), ("type", "track"), ("limit", "1")])
            .await?;
        let search: TrackSearch = response.json().await?;

        Ok(search.tracks.items.into_iter().next().map(|t| {
            let lead = t.artists.into_iter().next();
            let (album_name, album_image, release_date) = match t.album {
                Some(album) => (Some(album.name), first_image(album.images), album.release_date),
                None => (None, None, None),
            };
            TrackMatch {
                id: t.id,
                name: t.name,
                artist_id: lead.as_ref().and_then(|a| a.id.clone()),
                artist_name: lead.map(|a| a.name),
                album_name,
                album_image,
                release_date,
                spotify_url: t.external_urls.spotify,
            }
        }))
    }

    /// Largest image of an artist, by id.
    pub async fn artist_image(&self, artist_id: &str) -> Result<Option<String>> {
        let path = format!("/artists/{}", urlencoding::encode(artist_id));
        let artist: ArtistObject = self.get(&path, &[]).await?.json().await?;
        Ok(first_image(artist.images))
    }

    /// Audio features for up to 100 track ids. Unknown ids are skipped.
    pub async fn audio_features(&self, track_ids: &[String]) -> Result<Vec<AudioFeatures>> {
        if track_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = track_ids.join(",");
        let response = self.get("/audio-features", &[("ids", ids.as_str())]).await?;
        let features: AudioFeaturesResponse = response.json().await?;
        Ok(features.audio_features.into_iter().flatten().collect())
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let token = self.tokens.access_token().await?;
        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            // Revoked or rotated credentials; the next call will re-authenticate.
            self.tokens.invalidate().await;
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(path = %path, status = status.as_u16(), "Spotify request failed");
        Err(UpstreamError::Status {
            service: "spotify",
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::IssuedToken;
    use async_trait::async_trait;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::time::Duration;

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn fetch_token(&self) -> Result<IssuedToken> {
            Ok(IssuedToken {
                access_token: "test-token".to_string(),
                expires_in: Duration::from_secs(3600),
            })
        }
    }

    async fn search(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        let q = params.get("q").cloned().unwrap_or_default();
        if q.matches('"').count() % 2 != 0 {
            return AxumStatus::BAD_REQUEST.into_response();
        }
        match params.get("type").map(String::as_str) {
            Some("artist") if q.contains("Nobody") => {
                Json(serde_json::json!({"artists": {"items": []}})).into_response()
            }
            Some("artist") => Json(serde_json::json!({
                "artists": {"items": [{
                    "id": "a1",
                    "name": "Radiohead",
                    "images": [{"url": "https://i/large"}, {"url": "https://i/small"}],
                    "external_urls": {"spotify": "https://open.spotify.com/artist/a1"}
                }]}
            }))
            .into_response(),
            Some("track") => Json(serde_json::json!({
                "tracks": {"items": [{
                    "id": "t1",
                    "name": "Reckoner",
                    "artists": [{"id": "a1", "name": "Radiohead"}],
                    "album": {"name": "In Rainbows", "images": [{"url": "https://i/album"}], "release_date": "2007-10-10"},
                    "external_urls": {"spotify": "https://open.spotify.com/track/t1"}
                }]}
            }))
            .into_response(),
            _ => AxumStatus::BAD_REQUEST.into_response(),
        }
    }

    async fn spawn_api() -> String {
        let app = Router::new()
            .route("/v1/search", get(search))
            .route(
                "/v1/artists/{id}",
                get(|Path(id): Path<String>| async move {
                    if id == "missing" {
                        AxumStatus::NOT_FOUND.into_response()
                    } else {
                        Json(serde_json::json!({
                            "id": id, "name": "x", "images": [{"url": "https://i/artist"}]
                        }))
                        .into_response()
                    }
                }),
            )
            .route(
                "/v1/audio-features",
                get(|| async {
                    Json(serde_json::json!({"audio_features": [
                        {"id": "t1", "valence": 0.2, "energy": 0.3},
                        null
                    ]}))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    async fn client() -> SpotifyClient<StaticToken> {
        let api = spawn_api().await;
        SpotifyClient::new(Client::new(), &api, TokenCache::new(StaticToken))
    }

    #[tokio::test]
    async fn test_search_artist_picks_first_image() {
        let client = client().await;
        let found = client.search_artist("Radiohead").await.unwrap().unwrap();

        assert_eq!(found.name, "Radiohead");
        assert_eq!(found.image.as_deref(), Some("https://i/large"));
        assert_eq!(
            found.spotify_url.as_deref(),
            Some("https://open.spotify.com/artist/a1")
        );
    }

    #[tokio::test]
    async fn test_search_artist_no_match() {
        let client = client().await;
        assert!(client.search_artist("Nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_with_embedded_quote_stays_balanced() {
        let client = client().await;
        assert!(client.search_artist("AC\"DC").await.unwrap().is_some());
        assert!(
            client
                .search_track("Say \"Hello", "The \"Band")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_field_filter_drops_quotes() {
        assert_eq!(field_filter("artist", "AC\"DC"), "artist:\"ACDC\"");
        assert_eq!(field_filter("track", "\"Heroes\""), "track:\"Heroes\"");
        assert_eq!(field_filter("artist", "Björk"), "artist:\"Björk\"");
    }

    #[tokio::test]
    async fn test_search_track() {
        let client = client().await;
        let found = client
            .search_track("Reckoner", "Radiohead")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.artist_id.as_deref(), Some("a1"));
        assert_eq!(found.album_name.as_deref(), Some("In Rainbows"));
        assert_eq!(found.album_image.as_deref(), Some("https://i/album"));
        assert_eq!(found.release_year(), Some(2007));
    }

    #[tokio::test]
    async fn test_artist_image_not_found_is_status_error() {
        let client = client().await;
        assert_eq!(
            client.artist_image("a1").await.unwrap().as_deref(),
            Some("https://i/artist")
        );

        let err = client.artist_image("missing").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_audio_features_skips_nulls() {
        let client = client().await;
        let features = client
            .audio_features(&["t1".to_string(), "t2".to_string()])
            .await
            .unwrap();
        assert_eq!(features, vec![AudioFeatures { valence: 0.2, energy: 0.3 }]);

        assert!(client.audio_features(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_release_year_formats() {
        let mut track = TrackMatch {
            id: "t".into(),
            name: "n".into(),
            artist_id: None,
            artist_name: None,
            album_name: None,
            album_image: None,
            release_date: Some("1997".into()),
            spotify_url: None,
        };
        assert_eq!(track.release_year(), Some(1997));
        track.release_date = Some("1997-05".into());
        assert_eq!(track.release_year(), Some(1997));
        track.release_date = Some("?".into());
        assert_eq!(track.release_year(), None);
        track.release_date = None;
        assert_eq!(track.release_year(), None);
    }
}
