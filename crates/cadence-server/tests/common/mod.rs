//! Common test utilities for integration tests.
//!
//! [`MockUpstream`] stands in for the Spotify accounts service, the Spotify
//! Web API, Last.fm and Groq on one local port and counts every call.
//! [`TestServer`] runs the real router against it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use parking_lot::Mutex;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use cadence_llm::{OpenAiBackend, OpenAiConfig};
use cadence_server::{AppState, Server, ServerConfig, SummarySettings};
use cadence_upstream::{LastfmClient, SpotifyClient};

pub const LASTFM_KEY: &str = "lastfm-test-key";

// ─────────────────────────────────────────────────────────────────────────────
// Mock upstream
// ─────────────────────────────────────────────────────────────────────────────

/// Calls received by the mock upstream.
#[derive(Debug, Default)]
pub struct Hits {
    pub token: AtomicUsize,
    pub search: AtomicUsize,
    pub artists: AtomicUsize,
    pub features: AtomicUsize,
    pub lastfm: AtomicUsize,
    pub chat: AtomicUsize,
    pub chat_models: Mutex<Vec<String>>,
}

impl Hits {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        [
            &self.token,
            &self.search,
            &self.artists,
            &self.features,
            &self.lastfm,
            &self.chat,
        ]
        .iter()
        .map(|c| c.load(Ordering::SeqCst))
        .sum()
    }
}

/// Behaviour of the mock upstream.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Text streamed by every model that is not rate limited.
    pub summary_text: String,
    /// Models answered with 429.
    pub rate_limited: Vec<String>,
    /// Delay before answering `/audio-features`.
    pub features_delay: Duration,
    /// Token endpoint refuses every request.
    pub token_denied: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            summary_text: "Moody trip hop for a rainy evening.".to_string(),
            rate_limited: Vec::new(),
            features_delay: Duration::ZERO,
            token_denied: false,
        }
    }
}

#[derive(Clone)]
struct MockState {
    hits: Arc<Hits>,
    behavior: Arc<MockBehavior>,
}

/// A local stand-in for every upstream API.
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub hits: Arc<Hits>,
    _handle: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start(behavior: MockBehavior) -> Result<Self> {
        let state = MockState {
            hits: Arc::new(Hits::default()),
            behavior: Arc::new(behavior),
        };
        let hits = state.hits.clone();

        let app = Router::new()
            .route("/accounts/api/token", post(token))
            .route("/spotify/v1/search", get(search))
            .route("/spotify/v1/artists/{id}", get(artist))
            .route("/spotify/v1/audio-features", get(audio_features))
            .route("/lastfm/2.0/", get(lastfm))
            .route("/groq/v1/chat/completions", post(chat))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            addr,
            hits,
            _handle: handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn token(State(s): State<MockState>) -> Response {
    s.hits.token.fetch_add(1, Ordering::SeqCst);
    if s.behavior.token_denied {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_client"})),
        )
            .into_response();
    }
    Json(serde_json::json!({
        "access_token": "mock-access-token",
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

async fn search(
    State(s): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    s.hits.search.fetch_add(1, Ordering::SeqCst);
    let q = params.get("q").cloned().unwrap_or_default();
    if q.contains("Nobody") {
        return match params.get("type").map(String::as_str) {
            Some("artist") => Json(serde_json::json!({"artists": {"items": []}})),
            _ => Json(serde_json::json!({"tracks": {"items": []}})),
        }
        .into_response();
    }
    if q.contains("Broken") {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match params.get("type").map(String::as_str) {
        Some("artist") => Json(serde_json::json!({
            "artists": {"items": [{
                "id": "art1",
                "name": "Portishead",
                "images": [{"url": "https://img/portishead-640"}, {"url": "https://img/portishead-64"}],
                "external_urls": {"spotify": "https://open.spotify.com/artist/art1"}
            }]}
        }))
        .into_response(),
        Some("track") => {
            let year = if q.contains("Glory Box") { "1994-08-22" } else { "1997-09-29" };
            Json(serde_json::json!({
                "tracks": {"items": [{
                    "id": format!("trk{}", q.len()),
                    "name": "Roads",
                    "artists": [{"id": "art1", "name": "Portishead"}],
                    "album": {
                        "name": "Dummy",
                        "images": [{"url": "https://img/dummy-640"}],
                        "release_date": year
                    },
                    "external_urls": {"spotify": "https://open.spotify.com/track/trk"}
                }]}
            }))
            .into_response()
        }
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn artist(State(s): State<MockState>, Path(id): Path<String>) -> Response {
    s.hits.artists.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "id": id,
        "name": "Portishead",
        "images": [{"url": "https://img/artist-640"}]
    }))
    .into_response()
}

async fn audio_features(
    State(s): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    s.hits.features.fetch_add(1, Ordering::SeqCst);
    if !s.behavior.features_delay.is_zero() {
        tokio::time::sleep(s.behavior.features_delay).await;
    }
    let ids = params.get("ids").cloned().unwrap_or_default();
    let features: Vec<_> = ids
        .split(',')
        .filter(|id| !id.is_empty())
        .map(|_| serde_json::json!({"valence": 0.2, "energy": 0.3}))
        .collect();
    Json(serde_json::json!({ "audio_features": features })).into_response()
}

async fn lastfm(
    State(s): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    s.hits.lastfm.fetch_add(1, Ordering::SeqCst);
    if params.get("api_key").map(String::as_str) != Some(LASTFM_KEY) {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": 10, "message": "Invalid API key"})),
        )
            .into_response();
    }
    if params.get("user").map(String::as_str) == Some("ghost") {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": 6, "message": "User not found"})),
        )
            .into_response();
    }
    Json(serde_json::json!({
        "recenttracks": {
            "track": [{"name": "Roads", "artist": {"#text": "Portishead"}}],
            "@attr": {
                "user": params.get("user"),
                "perPage": params.get("limit"),
                "method": params.get("method"),
                "format": params.get("format")
            }
        }
    }))
    .into_response()
}

async fn chat(State(s): State<MockState>, Json(body): Json<serde_json::Value>) -> Response {
    s.hits.chat.fetch_add(1, Ordering::SeqCst);
    let model = body["model"].as_str().unwrap_or_default().to_string();
    s.hits.chat_models.lock().push(model.clone());

    if s.behavior.rate_limited.contains(&model) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "2")],
            Json(serde_json::json!({"error": {"message": "Rate limit reached for model"}})),
        )
            .into_response();
    }

    let mut sse = String::new();
    for word in s.behavior.summary_text.split_inclusive(' ') {
        let chunk = serde_json::json!({
            "id": "chatcmpl-1",
            "model": model,
            "choices": [{"index": 0, "delta": {"content": word}, "finish_reason": null}]
        });
        sse.push_str(&format!("data: {}\n\n", chunk));
    }
    let last = serde_json::json!({
        "id": "chatcmpl-1",
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
    });
    sse.push_str(&format!("data: {}\n\ndata: [DONE]\n\n", last));

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from(sse),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Test server
// ─────────────────────────────────────────────────────────────────────────────

/// Which credentials the server under test holds.
#[derive(Debug, Clone)]
pub struct TestOptions {
    pub spotify: bool,
    pub lastfm: bool,
    pub summary: bool,
    pub models: Vec<String>,
    pub enrich_timeout: Duration,
    pub cors_origins: Vec<String>,
    pub behavior: MockBehavior,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            spotify: true,
            lastfm: true,
            summary: true,
            models: vec!["primary".to_string(), "secondary".to_string()],
            enrich_timeout: Duration::from_secs(2),
            cors_origins: vec!["https://rj.github.io".to_string()],
            behavior: MockBehavior::default(),
        }
    }
}

impl TestOptions {
    /// No credentials at all.
    pub fn without_secrets() -> Self {
        Self {
            spotify: false,
            lastfm: false,
            summary: false,
            ..Self::default()
        }
    }
}

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client for this server.
    pub client: Client,
    /// Upstream stand-in the server talks to.
    pub upstream: MockUpstream,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server holding every credential.
    pub async fn start() -> Result<Self> {
        Self::start_with(TestOptions::default()).await
    }

    pub async fn start_with(options: TestOptions) -> Result<Self> {
        let upstream = MockUpstream::start(options.behavior.clone()).await?;

        // Find an available port
        let addr = find_available_port().await?;

        let summary = SummarySettings {
            models: options.models.clone(),
            enrich_timeout: options.enrich_timeout,
            ..SummarySettings::default()
        };
        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(false)
            .with_cors_origins(options.cors_origins.clone())
            .with_summary(summary);

        let mut state = AppState::new(config);
        if options.spotify {
            state = state.with_spotify(SpotifyClient::with_credentials(
                Client::new(),
                &upstream.url("/accounts"),
                &upstream.url("/spotify/v1"),
                "client-id",
                "client-secret",
            ));
        }
        if options.lastfm {
            state = state.with_lastfm(LastfmClient::new(
                Client::new(),
                upstream.url("/lastfm/2.0/"),
                LASTFM_KEY,
            ));
        }
        if options.summary {
            let backend = OpenAiBackend::new(
                OpenAiConfig::groq("gsk-test").with_base_url(upstream.url("/groq/v1")),
            )?;
            state = state.with_llm(backend);
        }

        // Start server in background
        let server = Server::from_state(state);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        // Wait for server to be ready
        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            upstream,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    pub fn hits(&self) -> &Hits {
        &self.upstream.hits
    }

    /// Post a summary request for `tracks` (`(name, artist)` pairs).
    pub async fn summarize(&self, tracks: &[(&str, &str)], mode: &str) -> Result<reqwest::Response> {
        let tracks: Vec<_> = tracks
            .iter()
            .map(|(name, artist)| serde_json::json!({"name": name, "artist": artist}))
            .collect();
        let body = serde_json::json!({"tracks": tracks, "mode": mode, "trackCount": tracks.len()});
        Ok(self.post("/?type=summary").json(&body).send().await?)
    }

    /// Check if server is healthy.
    pub async fn health(&self) -> Result<bool> {
        let resp = self.get("/health").send().await?;
        Ok(resp.status().is_success())
    }
}

/// Parsed `text/event-stream` body.
#[derive(Debug, Default)]
pub struct SseBody {
    /// Concatenated `{"text": ..}` payloads.
    pub text: String,
    /// `event: meta` payloads in order.
    pub meta: Vec<serde_json::Value>,
    /// Position of each meta frame among all frames.
    pub meta_positions: Vec<usize>,
    pub frames: usize,
    pub done: bool,
}

/// Split an SSE body into frames.
pub fn parse_sse(body: &str) -> SseBody {
    let mut parsed = SseBody::default();
    for frame in body.split("\n\n").filter(|f| !f.trim().is_empty()) {
        let mut event = None;
        let mut data = String::new();
        for line in frame.lines() {
            if let Some(e) = line.strip_prefix("event:") {
                event = Some(e.trim().to_string());
            } else if let Some(d) = line.strip_prefix("data:") {
                data.push_str(d.trim_start());
            }
        }
        if data.is_empty() {
            continue;
        }
        let index = parsed.frames;
        parsed.frames += 1;
        if data == "[DONE]" {
            parsed.done = true;
            continue;
        }
        let json: serde_json::Value = serde_json::from_str(&data).unwrap_or_default();
        match event.as_deref() {
            Some("meta") => {
                parsed.meta.push(json);
                parsed.meta_positions.push(index);
            }
            _ => {
                if let Some(text) = json["text"].as_str() {
                    parsed.text.push_str(text);
                }
            }
        }
    }
    parsed
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
