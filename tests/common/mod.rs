//! Shared utilities for end-to-end tests.

use std::net::SocketAddr;
use std::time::Duration;

use gateway_runtime::lifecycle::Shutdown;
use gateway_runtime::net::{Listener, ListenerError};
use gateway_runtime::Gateway;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A gateway serving on an ephemeral local port.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    server: JoinHandle<Result<(), ListenerError>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the accept loop to return.
    #[allow(dead_code)]
    pub async fn stop(self) -> Result<(), ListenerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

/// Bind `127.0.0.1:0` and serve `gateway` on it.
pub async fn start(gateway: Gateway) -> TestGateway {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, 64);

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = gateway.into_server();
    let server = tokio::spawn(async move { server.run(listener, receiver).await });

    TestGateway { addr, shutdown, server }
}

/// Client that opens a fresh connection per request; the gateway closes
/// every connection after one response.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Write `request` on a raw connection and read until the peer closes.
/// A reset counts as a close.
#[allow(dead_code)]
pub async fn raw_exchange(addr: SocketAddr, request: &[u8], half_close: bool) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    if half_close {
        stream.shutdown().await.unwrap();
    }

    let mut received = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("connection was not closed");
    if let Err(e) = read {
        assert!(
            matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
            ),
            "unexpected read error: {e}"
        );
    }
    received
}
