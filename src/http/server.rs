//! HTTP server: accept loop and per-connection serving.
//!
//! # Responsibilities
//! - Accept connections from the bounded [`Listener`]
//! - Serve exactly one HTTP/1.1 request per connection (keep-alive off)
//! - Wire up tower-http layers (request ID, tracing)
//! - Tear a connection down without a response when it is destroyed
//! - Stop accepting on shutdown and drain in-flight connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::dispatch::Dispatcher;
use crate::http::service::GatewayService;
use crate::net::{ConnectionGuard, ConnectionHandle, ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// HTTP server for the gateway.
pub struct GatewayServer {
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    shutdown_grace: Duration,
}

impl GatewayServer {
    pub fn new(dispatcher: Arc<Dispatcher>, shutdown_grace: Duration) -> Self {
        Self {
            dispatcher,
            tracker: ConnectionTracker::new(),
            shutdown_grace,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept and serve connections until `shutdown` fires, then wait up to
    /// the grace period for open connections to finish.
    pub async fn run(
        &self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        tracing::info!(
            address = ?listener.local_addr().ok(),
            max_connections = listener.max_connections(),
            "Gateway accepting connections"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let guard = self.tracker.track();
                    let handle = ConnectionHandle::new(guard.id());
                    tokio::spawn(serve_connection(
                        Arc::clone(&self.dispatcher),
                        stream,
                        peer_addr,
                        handle,
                        permit,
                        guard,
                    ));
                }
            }
        }

        let remaining = self.tracker.wait_for_drain(self.shutdown_grace).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Grace period elapsed with connections still open");
        }
        Ok(())
    }
}

/// Serve one connection. Permit and guard are held until it closes.
async fn serve_connection(
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    handle: ConnectionHandle,
    _permit: ConnectionPermit,
    _guard: ConnectionGuard,
) {
    let svc = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .service(GatewayService::new(dispatcher, handle.clone(), Some(peer_addr)));

    let conn = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), TowerToHyperService::new(svc));

    tokio::select! {
        biased;
        () = handle.destroyed() => {
            tracing::debug!(connection_id = %handle.id(), peer_addr = %peer_addr, "Connection destroyed");
        }
        result = conn => {
            if let Err(e) = result {
                tracing::debug!(connection_id = %handle.id(), error = %e, "Connection error");
            }
        }
    }
}
