//! Request header helpers.
//!
//! # Responsibilities
//! - Read the declared content-length
//! - Resolve proxy-forwarded values (scheme, host, client IP) in priority order
//! - Read the request ID attached by the tower-http layer
//!
//! # Design Decisions
//! - Forwarded headers may carry comma-separated hops; only the first is used
//! - Unparseable values count as absent rather than failing the request

use axum::http::header::CONTENT_LENGTH;
use axum::http::HeaderMap;

/// Header carrying the per-request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Scheme headers, most specific first.
pub const PROTOCOL_HEADERS: &[&str] = &["x-client-scheme", "x-scheme", "x-forwarded-proto"];

/// Host headers, most specific first.
pub const HOST_HEADERS: &[&str] = &["ali-swift-stat-host", "x-forwarded-host", "host"];

/// Client IP headers, most specific first.
pub const REAL_IP_HEADERS: &[&str] = &[
    "ali-cdn-real-ip",
    "x-original-forwarded-for",
    "x-real-ip",
    "x-forwarded-for",
];

/// Declared body length. Missing or malformed values are `None`.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// First non-empty value among `names`, keeping only the first
/// comma-separated item.
pub fn first_forwarded<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let first = value.split(',').next().unwrap_or_default().trim();
        (!first.is_empty()).then_some(first)
    })
}

pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
