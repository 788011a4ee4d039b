//! API routes.
//!
//! The widget talks to a single URL and picks the operation with the `type`
//! query parameter, so everything except `/health` goes through the two
//! dispatchers here.

pub mod health;
pub mod lastfm;
pub mod spotify;
pub mod summary;

pub use health::{HealthResponse, health_routes};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::Method,
    response::Response,
};
use serde::Deserialize;

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Query parameters understood by the dispatchers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchParams {
    /// Operation selector.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub artist: Option<String>,
    pub track: Option<String>,
    pub user: Option<String>,
    pub method: Option<String>,
    pub limit: Option<String>,
}

/// The operations behind `?type=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Spotify,
    Lastfm,
    Summary,
}

impl Operation {
    /// Parse the `type` parameter.
    pub fn parse(kind: Option<&str>) -> Result<Self> {
        match kind.map(str::trim) {
            None | Some("") => Err(ServerError::BadRequest(
                "Missing type parameter".to_string(),
            )),
            Some("spotify") => Ok(Operation::Spotify),
            Some("lastfm") => Ok(Operation::Lastfm),
            Some("summary") => Ok(Operation::Summary),
            Some(other) => Err(ServerError::BadRequest(format!("Unknown type: {}", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Spotify => "spotify",
            Operation::Lastfm => "lastfm",
            Operation::Summary => "summary",
        }
    }
}

/// `GET /?type=spotify|lastfm`
pub async fn dispatch_get(
    State(state): State<AppState>,
    Query(params): Query<DispatchParams>,
) -> Result<Response> {
    match Operation::parse(params.kind.as_deref())? {
        Operation::Spotify => spotify::lookup(&state, &params).await,
        Operation::Lastfm => lastfm::forward(&state, &params).await,
        Operation::Summary => Err(ServerError::MethodNotAllowed(
            "type=summary requires POST".to_string(),
        )),
    }
}

/// `POST /?type=summary`
pub async fn dispatch_post(
    State(state): State<AppState>,
    Query(params): Query<DispatchParams>,
    body: Bytes,
) -> Result<Response> {
    match Operation::parse(params.kind.as_deref())? {
        Operation::Summary => summary::stream_summary(&state, &body).await,
        op => Err(ServerError::MethodNotAllowed(format!(
            "type={} requires GET",
            op.as_str()
        ))),
    }
}

/// Any other method on `/`.
pub async fn method_not_allowed(method: Method) -> ServerError {
    ServerError::MethodNotAllowed(format!("{} is not supported", method))
}
