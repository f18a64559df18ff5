//! tower `Service` adapter between hyper and the dispatcher.
//!
//! One service value is built per connection so it can carry that
//! connection's destroy handle and peer address.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use hyper::body::Incoming;

use crate::dispatch::Dispatcher;
use crate::net::ConnectionHandle;

/// Serves requests on one connection through the shared [`Dispatcher`].
#[derive(Clone)]
pub struct GatewayService {
    dispatcher: Arc<Dispatcher>,
    conn: ConnectionHandle,
    peer_addr: Option<SocketAddr>,
}

impl GatewayService {
    pub fn new(dispatcher: Arc<Dispatcher>, conn: ConnectionHandle, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            dispatcher,
            conn,
            peer_addr,
        }
    }
}

impl std::fmt::Debug for GatewayService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayService")
            .field("conn", &self.conn.id())
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

impl tower::Service<Request<Incoming>> for GatewayService {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let dispatcher = Arc::clone(&self.dispatcher);
        let conn = self.conn.clone();
        let peer_addr = self.peer_addr;

        Box::pin(async move {
            match dispatcher.dispatch(req, &conn, peer_addr).await {
                Some(response) => Ok(response),
                // The connection task drops this future once it sees the
                // destroy signal; no response may be produced.
                None => match std::future::pending::<Infallible>().await {},
            }
        })
    }
}
