//! Last.fm passthrough.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use cadence_upstream::LastfmQuery;

use super::DispatchParams;
use crate::error::{Result, ServerError};
use crate::state::AppState;

/// `GET /?type=lastfm&user=..[&method=..][&limit=..]`
///
/// The upstream status and body are returned as they came.
pub async fn forward(state: &AppState, params: &DispatchParams) -> Result<Response> {
    let query = LastfmQuery::parse(
        params.user.as_deref(),
        params.method.as_deref(),
        params.limit.as_deref(),
    )?;

    let client = state
        .lastfm
        .as_ref()
        .ok_or_else(|| ServerError::Config("LASTFM_API_KEY is not set".to_string()))?;

    let reply = client.forward(&query).await?;
    if reply.status >= 400 {
        tracing::warn!(
            method = %query.method,
            status = reply.status,
            "Last.fm returned an error, passing it through"
        );
    }

    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = reply
        .content_type
        .unwrap_or_else(|| "application/json".to_string());
    Ok((status, [(header::CONTENT_TYPE, content_type)], reply.body).into_response())
}
