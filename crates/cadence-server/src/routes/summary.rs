//! Summary streaming endpoint.

use std::convert::Infallible;

use axum::{
    http::{HeaderName, HeaderValue},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
};

use crate::error::Result;
use crate::state::AppState;
use crate::summary::{self, SummaryRequest};

/// `POST /?type=summary`
///
/// Streams `data: {"text": ..}` frames, optional `event: meta` frames and a
/// final `data: [DONE]`.
pub async fn stream_summary(state: &AppState, body: &[u8]) -> Result<Response> {
    let input = SummaryRequest::from_slice(body)?.validate(state.config.summary.max_tracks)?;
    let stream = summary::summarize(state, input).await?;

    let model = HeaderValue::from_str(&stream.model)
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    let headers = [
        (
            HeaderName::from_static("x-cache"),
            HeaderValue::from_static(stream.cache.as_str()),
        ),
        (HeaderName::from_static("x-model"), model),
    ];

    let mut frames = stream.frames;
    let sse_stream = async_stream::stream! {
        while let Some(frame) = frames.recv().await {
            yield Ok::<_, Infallible>(frame.to_event());
        }
    };

    Ok((headers, Sse::new(sse_stream).keep_alive(KeepAlive::default())).into_response())
}
