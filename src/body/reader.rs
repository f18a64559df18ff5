//! Streaming request body reader with size enforcement.
//!
//! # Responsibilities
//! - Skip the stream entirely when no body is declared
//! - Reject oversized declarations before reading; destroy the connection
//!   for egregious ones (more than twice the limit)
//! - Accumulate frames while checking them against the declared length
//! - Classify transport failures as aborted or errored
//!
//! The body is taken by value and dropped on every return path, so no frame
//! polling outlives the call.

use std::io;
use std::pin::pin;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;

use crate::error::GatewayError;
use crate::net::ConnectionHandle;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reads a complete request body within a size budget.
#[derive(Debug, Clone)]
pub struct BodyReader {
    max_body_size: u64,
    read_timeout: Option<Duration>,
}

impl BodyReader {
    pub fn new(max_body_size: usize) -> Self {
        Self {
            max_body_size: max_body_size as u64,
            read_timeout: None,
        }
    }

    /// Fail with `BodyDataAborted` if no frame arrives within `timeout`.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn max_body_size(&self) -> u64 {
        self.max_body_size
    }

    /// Read `body` to completion.
    ///
    /// `declared` is the request's content-length. `conn` is destroyed when
    /// the client declares more than twice the limit or sends more bytes
    /// than it declared.
    pub async fn read<B>(
        &self,
        body: B,
        declared: Option<u64>,
        conn: &ConnectionHandle,
    ) -> Result<Bytes, GatewayError>
    where
        B: HttpBody,
        B::Error: Into<BoxError>,
    {
        let declared = match declared {
            None | Some(0) => return Ok(Bytes::new()),
            Some(n) => n,
        };

        let limit = self.max_body_size;
        if declared > limit.saturating_mul(2) {
            tracing::warn!(
                connection_id = %conn.id(),
                declared,
                limit,
                "Declared body far exceeds limit, destroying connection"
            );
            conn.destroy();
            return Err(GatewayError::BodyDataTooLarge { declared, limit });
        }
        if declared > limit {
            return Err(GatewayError::BodyDataTooLarge { declared, limit });
        }

        let mut buf = BytesMut::with_capacity(declared as usize);
        let mut body = pin!(body);

        loop {
            let next = match self.read_timeout {
                Some(timeout) => tokio::time::timeout(timeout, body.frame())
                    .await
                    .map_err(|_| GatewayError::BodyDataAborted)?,
                None => body.frame().await,
            };

            let frame = match next {
                None => break,
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(classify(e.into())),
            };

            // Trailers carry no payload.
            let Ok(data) = frame.into_data() else {
                continue;
            };
            buf.put(data);

            let received = buf.len() as u64;
            if received > declared {
                tracing::warn!(
                    connection_id = %conn.id(),
                    declared,
                    received,
                    "Body exceeds declared length, destroying connection"
                );
                conn.destroy();
                return Err(GatewayError::BodyDataContentError { declared, received });
            }
        }

        let received = buf.len() as u64;
        if received != declared {
            return Err(GatewayError::BodyDataContentError { declared, received });
        }
        Ok(buf.freeze())
    }
}

/// Map a body stream error onto the body error taxonomy.
fn classify(err: BoxError) -> GatewayError {
    if let Some(e) = err.downcast_ref::<hyper::Error>() {
        if e.is_incomplete_message() || e.is_canceled() || e.is_closed() {
            return GatewayError::BodyDataAborted;
        }
    }

    let root: &(dyn std::error::Error + 'static) = err.as_ref();
    let mut source = Some(root);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if is_disconnect(io_err.kind()) {
                return GatewayError::BodyDataAborted;
            }
        }
        source = e.source();
    }

    GatewayError::BodyDataError(err.to_string())
}

fn is_disconnect(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use http_body_util::{Empty, StreamBody};
    use hyper::body::Frame;

    fn chunks(parts: &[&'static [u8]]) -> StreamBody<impl futures_util::Stream<Item = Result<Frame<Bytes>, io::Error>>> {
        let frames: Vec<Result<Frame<Bytes>, io::Error>> = parts
            .iter()
            .map(|p| Ok(Frame::data(Bytes::from_static(p))))
            .collect();
        StreamBody::new(stream::iter(frames))
    }

    #[tokio::test]
    async fn absent_or_zero_length_is_empty() {
        let reader = BodyReader::new(16);
        let conn = ConnectionHandle::detached();

        let body = reader.read(chunks(&[b"ignored"]), None, &conn).await.unwrap();
        assert!(body.is_empty());
        let body = reader.read(chunks(&[b"ignored"]), Some(0), &conn).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn concatenates_chunks_in_order() {
        let reader = BodyReader::new(64);
        let conn = ConnectionHandle::detached();

        let body = reader
            .read(chunks(&[b"hello ", b"gate", b"way"]), Some(13), &conn)
            .await
            .unwrap();
        assert_eq!(&body[..], b"hello gateway");
        assert!(!conn.is_destroyed());
    }

    #[tokio::test]
    async fn over_limit_rejects_without_destroying() {
        let reader = BodyReader::new(10);
        let conn = ConnectionHandle::detached();

        let err = reader.read(Empty::<Bytes>::new(), Some(15), &conn).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::BodyDataTooLarge { declared: 15, limit: 10 }
        ));
        assert!(!conn.is_destroyed());
    }

    #[tokio::test]
    async fn far_over_limit_destroys_before_reading() {
        let reader = BodyReader::new(10);
        let conn = ConnectionHandle::detached();

        // A stream that never yields proves nothing is read.
        let never = StreamBody::new(stream::pending::<Result<Frame<Bytes>, io::Error>>());
        let err = reader.read(never, Some(21), &conn).await.unwrap_err();
        assert!(matches!(err, GatewayError::BodyDataTooLarge { .. }));
        assert!(conn.is_destroyed());
    }

    #[tokio::test]
    async fn overflow_destroys_connection() {
        let reader = BodyReader::new(64);
        let conn = ConnectionHandle::detached();

        let err = reader
            .read(chunks(&[b"12345", b"67890"]), Some(6), &conn)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::BodyDataContentError { declared: 6, received: 10 }
        ));
        assert!(conn.is_destroyed());
    }

    #[tokio::test]
    async fn truncated_stream_is_content_error() {
        let reader = BodyReader::new(64);
        let conn = ConnectionHandle::detached();

        let err = reader.read(chunks(&[b"abc"]), Some(8), &conn).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::BodyDataContentError { declared: 8, received: 3 }
        ));
        assert!(!conn.is_destroyed());
    }

    #[tokio::test]
    async fn disconnect_is_aborted_other_errors_carry_text() {
        let reader = BodyReader::new(64);
        let conn = ConnectionHandle::detached();

        let reset = StreamBody::new(stream::iter(vec![
            Ok(Frame::data(Bytes::from_static(b"ab"))),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset")),
        ]));
        let err = reader.read(reset, Some(4), &conn).await.unwrap_err();
        assert!(matches!(err, GatewayError::BodyDataAborted));

        let broken = StreamBody::new(stream::iter(vec![Err::<Frame<Bytes>, _>(io::Error::new(
            io::ErrorKind::InvalidData,
            "bad chunk encoding",
        ))]));
        let err = reader.read(broken, Some(4), &conn).await.unwrap_err();
        match err {
            GatewayError::BodyDataError(text) => assert!(text.contains("bad chunk encoding")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_stream_times_out_as_aborted() {
        let reader = BodyReader::new(64).with_read_timeout(Some(Duration::from_millis(20)));
        let conn = ConnectionHandle::detached();

        let stalled = StreamBody::new(stream::pending::<Result<Frame<Bytes>, io::Error>>());
        let err = reader.read(stalled, Some(4), &conn).await.unwrap_err();
        assert!(matches!(err, GatewayError::BodyDataAborted));
    }
}
