//! Response writing.
//!
//! # Responsibilities
//! - Turn the context's response data into a hyper response
//! - Always set Content-Type and Cache-Control
//!
//! # Design Decisions
//! - Business errors are still status 200; the status comes from the context
//! - Invalid header values set by handlers are dropped with a warning, never fatal

use axum::body::Body;
use axum::http::header::{HeaderName, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Response};

use crate::context::ResponseData;

/// Build the client response from what the handler and dispatcher wrote.
pub fn into_response(data: ResponseData) -> Response<Body> {
    let mut response = Response::new(Body::from(data.body));
    *response.status_mut() = data.status;
    insert_header(&mut response, CONTENT_TYPE, &data.content_type);
    insert_header(&mut response, CACHE_CONTROL, &data.cache_control);
    response
}

fn insert_header(response: &mut Response<Body>, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            response.headers_mut().insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, value, "Dropping invalid response header value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use bytes::Bytes;

    #[tokio::test]
    async fn writes_status_headers_and_body() {
        let data = ResponseData {
            status: StatusCode::CREATED,
            body: Bytes::from_static(b"{}"),
            ..ResponseData::default()
        };
        let response = into_response(data);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"{}");
    }

    #[test]
    fn invalid_header_value_is_dropped() {
        let data = ResponseData {
            cache_control: "bad\nvalue".into(),
            ..ResponseData::default()
        };
        let response = into_response(data);
        assert!(response.headers().get(CACHE_CONTROL).is_none());
    }
}
