//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count live connections so shutdown can drain them
//! - Give the request pipeline a way to forcibly destroy its connection
//!
//! A connection is served by exactly one task. That task selects on its
//! [`ConnectionHandle`]; once the handle is destroyed the hyper connection
//! future is dropped, which closes the socket without writing a response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Destroy switch for one connection, shared between the connection task
/// and the request pipeline running on it.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    destroyed: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            id,
            destroyed: Arc::new(tx),
        }
    }

    /// Handle for code that runs outside a real connection (tests, in-process dispatch).
    pub fn detached() -> Self {
        Self::new(ConnectionId::new())
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Tear the connection down. No response will be written on it.
    pub fn destroy(&self) {
        if !self.destroyed.send_replace(true) {
            tracing::debug!(connection_id = %self.id, "Connection destroy requested");
            crate::observability::metrics::record_connection_destroyed();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.borrow()
    }

    /// Resolves once [`destroy`](Self::destroy) has been called.
    pub async fn destroyed(&self) {
        let mut rx = self.destroyed.subscribe();
        // The sender lives inside `self`, so the channel cannot close here.
        let _ = rx.wait_for(|destroyed| *destroyed).await;
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("gateway_active_connections").set(active as f64);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or the grace period runs out.
    /// Returns the number of connections still open.
    pub async fn wait_for_drain(&self, grace: Duration) -> u64 {
        let deadline = tokio::time::Instant::now() + grace;
        while self.active_count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.active_count()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("gateway_active_connections").set(remaining as f64);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
