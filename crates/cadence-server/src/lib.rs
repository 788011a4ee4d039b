//! HTTP server for the Cadence proxy.
//!
//! Sits between the portfolio widget and three upstream APIs so that no
//! credential ever reaches the browser.
//!
//! # Features
//!
//! - Spotify artist and album images via client-credentials auth
//! - Last.fm `user.*` passthrough with a server-held key
//! - Streaming AI summaries with model fallback, enrichment and a 7-day cache
//! - CORS limited to the site's origins and localhost
//! - Request logging
//!
//! # Example
//!
//! ```ignore
//! use cadence_server::{AppState, Server, ServerConfig};
//!
//! let config = cadence_config::load_config(None)?.config;
//! let server = Server::from_state(AppState::from_cadence_config(&config)?);
//! server.run().await?;
//! ```

pub mod cache;
pub mod config;
pub mod cors;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod summary;

pub use config::{ServerConfig, SummarySettings};
pub use error::{Result, ServerError};
pub use middleware::{preflight_no_content, request_logging_middleware};
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::info;

/// The Cadence HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server with no upstream credentials.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/",
                get(routes::dispatch_get)
                    .post(routes::dispatch_post)
                    .fallback(routes::method_not_allowed),
            )
            .merge(routes::health_routes())
            // Panics become the standard 500 body (innermost, so the
            // layers below still log and add CORS headers)
            .layer(CatchPanicLayer::custom(error::panic_response))
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                middleware::request_logging_middleware,
            ))
            // TraceLayer for detailed HTTP tracing
            .layer(TraceLayer::new_for_http())
            .layer(cors::cors_layer(self.state.config.cors_origins.clone()))
            // Outermost: preflight answered by the CORS layer becomes 204
            .layer(axum::middleware::from_fn(middleware::preflight_no_content))
            .with_state(self.state.clone())
    }

    /// Run the server on the configured address.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        let local = listener.local_addr().unwrap_or(addr);

        info!(
            addr = %local,
            spotify = self.state.spotify.is_some(),
            lastfm = self.state.lastfm.is_some(),
            summary = self.state.llm.is_some(),
            store = self.state.summaries.name(),
            "Starting server"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }

    /// Shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }
}
