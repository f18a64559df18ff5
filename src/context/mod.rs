//! Per-request context.
//!
//! # Data Flow
//! ```text
//! Request head (method, uri, headers) + peer address
//!     → RequestContext::new
//!     → dispatcher fills `request` (path params, query, body, files)
//!     → interceptors and handler read `request`, write `response`
//!     → dispatcher turns `response` into the hyper response
//! ```
//!
//! # Design Decisions
//! - Owned by the connection task; never shared, so no locking
//! - Sessions are decoded lazily and cached per lower-cased name
//! - `custom` hands the whole response to the handler; nothing else is written

pub mod session;
pub mod storage;

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::body::UploadedFile;
use crate::http::request::{first_forwarded, request_id, HOST_HEADERS, PROTOCOL_HEADERS, REAL_IP_HEADERS};

pub use session::{DisabledSessionCodec, Session, SessionCodec};
pub use storage::ClientStorage;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Bookkeeping for one request.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub start_at: Instant,
    /// Cleared for system routes.
    pub access_log: bool,
    pub request_id: Option<String>,
}

/// Decoded request data.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub raw_body: Bytes,
    /// Wildcard captures from routing.
    pub path: Vec<String>,
    pub query: HashMap<String, String>,
    pub body: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

/// Response under construction.
pub struct ResponseData {
    /// When false the dispatcher writes nothing itself and returns `custom`.
    pub respond: bool,
    pub status: StatusCode,
    pub content_type: String,
    pub cache_control: String,
    pub body: Bytes,
    pub custom: Option<Response<Body>>,
}

impl Default for ResponseData {
    fn default() -> Self {
        Self {
            respond: true,
            status: StatusCode::OK,
            content_type: JSON_CONTENT_TYPE.to_string(),
            cache_control: "no-cache".to_string(),
            body: Bytes::new(),
            custom: None,
        }
    }
}

impl fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseData")
            .field("respond", &self.respond)
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("cache_control", &self.cache_control)
            .field("body_len", &self.body.len())
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Everything a handler can see and change about one request.
pub struct RequestContext {
    head: Parts,
    peer_addr: Option<SocketAddr>,
    pub runtime: Runtime,
    pub request: RequestData,
    pub response: ResponseData,
    sessions: HashMap<String, Session>,
    session_codec: Arc<dyn SessionCodec>,
}

impl RequestContext {
    pub fn new(head: Parts, peer_addr: Option<SocketAddr>, session_codec: Arc<dyn SessionCodec>) -> Self {
        let request_id = request_id(&head.headers);
        Self {
            head,
            peer_addr,
            runtime: Runtime {
                start_at: Instant::now(),
                access_log: true,
                request_id,
            },
            request: RequestData::default(),
            response: ResponseData::default(),
            sessions: HashMap::new(),
            session_codec,
        }
    }

    pub fn method(&self) -> &Method {
        &self.head.method
    }

    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// Path plus query string, as the client sent it.
    pub fn url(&self) -> &str {
        self.head
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.head.uri.path())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Scheme as seen by the client, `http` when no proxy says otherwise.
    pub fn protocol(&self) -> String {
        first_forwarded(&self.head.headers, PROTOCOL_HEADERS)
            .unwrap_or("http")
            .to_string()
    }

    /// Host as seen by the client, empty when unknown.
    pub fn host(&self) -> String {
        first_forwarded(&self.head.headers, HOST_HEADERS)
            .unwrap_or_default()
            .to_string()
    }

    /// Client IP from proxy headers, falling back to the socket peer.
    pub fn real_ip(&self) -> String {
        match first_forwarded(&self.head.headers, REAL_IP_HEADERS) {
            Some(ip) => ip.to_string(),
            None => self
                .peer_addr
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
        }
    }

    /// Look a parameter up in the query, then the body, then the headers.
    /// Empty strings and nulls count as absent.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.request.query.get(name).filter(|v| !v.is_empty()) {
            return Some(Value::String(value.clone()));
        }
        if let Some(value) = self.request.body.get(name).filter(|v| is_present(v)) {
            return Some(value.clone());
        }
        self.header(&name.to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .map(|v| Value::String(v.to_string()))
    }

    /// [`get`](Self::get) rendered as a string. Non-string values use their
    /// JSON text.
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Session decoded from the ticket found under `name`.
    pub fn session(&mut self, name: &str) -> &Session {
        let key = name.to_lowercase();
        if !self.sessions.contains_key(&key) {
            let ticket = self.get_str(&key).unwrap_or_default();
            let session = Session::decode(&ticket, Arc::clone(&self.session_codec));
            self.sessions.insert(key.clone(), session);
        }
        &self.sessions[&key]
    }

    pub fn json(&mut self, data: &Value) {
        self.response.content_type = JSON_CONTENT_TYPE.to_string();
        self.response.body = Bytes::from(data.to_string());
    }

    pub fn html(&mut self, content: impl Into<String>) {
        self.response.content_type = HTML_CONTENT_TYPE.to_string();
        self.response.body = Bytes::from(content.into());
    }

    /// Take over the response. The dispatcher returns it unchanged and
    /// writes nothing of its own.
    pub fn custom(&mut self, response: impl IntoResponse) {
        self.response.respond = false;
        self.response.custom = Some(response.into_response());
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.head.method)
            .field("uri", &self.head.uri)
            .field("peer_addr", &self.peer_addr)
            .field("runtime", &self.runtime)
            .field("request", &self.request)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}
