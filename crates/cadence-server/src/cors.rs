//! Cross-origin policy for the widget.
//!
//! The widget is served from the site's own domain and, during development,
//! from a local Jekyll server. Anything else is refused.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, header, request::Parts};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Response headers the browser may read.
pub const EXPOSED_HEADERS: [&str; 2] = ["x-cache", "x-model"];

const LOCAL_HOSTS: [&str; 2] = ["http://localhost", "http://127.0.0.1"];

/// Whether `origin` may call the proxy.
///
/// Configured origins match exactly, ignoring a trailing slash. Local
/// development origins match on any port.
pub fn is_allowed_origin(origin: &str, configured: &[String]) -> bool {
    let origin = origin.trim_end_matches('/');
    if configured
        .iter()
        .any(|allowed| allowed.trim_end_matches('/') == origin)
    {
        return true;
    }

    LOCAL_HOSTS.iter().any(|host| match origin.strip_prefix(host) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix(':')
            .is_some_and(|port| !port.is_empty() && port.len() <= 5 && port.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    })
}

/// Build the CORS layer for the configured origins.
pub fn cors_layer(configured: Vec<String>) -> CorsLayer {
    let allow = AllowOrigin::predicate(move |origin: &HeaderValue, _: &Parts| {
        origin
            .to_str()
            .map(|o| is_allowed_origin(o, &configured))
            .unwrap_or(false)
    });

    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers(EXPOSED_HEADERS.map(HeaderName::from_static))
        .max_age(Duration::from_secs(24 * 60 * 60))
}
