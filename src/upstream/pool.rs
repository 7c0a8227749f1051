//! Bounded upstream connection pool.
//!
//! # Responsibilities
//! - Enforce the `max_connections` ceiling via semaphore
//! - Park released connections for reuse, drop stale ones
//! - Hand out leases that return capacity exactly once
//!
//! # Design Decisions
//! - Acquisition waits (never fails) while the pool is exhausted
//! - A lease is released by value, so double-release cannot compile
//! - A lease dropped without release discards its connection: its state
//!   is unknown (cancelled, errored, half-read body)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Body;
use hyper::body::Incoming;
use hyper::{Request, Response};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::upstream::connection::{ConnectionId, ConnectionState, Endpoint, UpstreamConnection};
use crate::upstream::error::{Phase, UpstreamError};

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured ceiling.
    pub capacity: usize,
    /// Leases that could be handed out right now without waiting.
    pub available: usize,
    /// Leases currently held by exchanges.
    pub in_use: usize,
    /// Open connections parked for reuse.
    pub idle: usize,
    /// Connections opened since startup.
    pub opened_total: u64,
}

#[derive(Debug)]
struct PoolShared {
    endpoint: Endpoint,
    capacity: usize,
    connect_timeout: Duration,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<UpstreamConnection>>,
    opened: AtomicU64,
}

impl PoolShared {
    fn idle(&self) -> MutexGuard<'_, Vec<UpstreamConnection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn park(&self, mut conn: UpstreamConnection) {
        if self.permits.is_closed() || conn.is_closed() {
            self.discard(conn, "not reusable");
            return;
        }
        let mut idle = self.idle();
        if idle.len() >= self.capacity {
            drop(idle);
            self.discard(conn, "idle list full");
            return;
        }
        debug_assert_eq!(conn.state(), ConnectionState::InUse);
        conn.set_state(ConnectionState::Idle);
        tracing::trace!(connection_id = %conn.id(), "Upstream connection returned to pool");
        idle.push(conn);
    }

    fn discard(&self, mut conn: UpstreamConnection, reason: &'static str) {
        conn.set_state(ConnectionState::Closed);
        tracing::debug!(connection_id = %conn.id(), reason, "Discarding upstream connection");
    }
}

/// Pool of HTTP/1.1 connections to the single upstream.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    pub fn new(endpoint: Endpoint, capacity: usize, connect_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                endpoint,
                capacity,
                connect_timeout,
                permits: Arc::new(Semaphore::new(capacity)),
                idle: Mutex::new(Vec::with_capacity(capacity)),
                opened: AtomicU64::new(0),
            }),
        }
    }

    /// Acquire a connection, waiting while the pool is at capacity.
    ///
    /// Reuses an idle connection when one is still alive, otherwise opens a
    /// new one within the connect timeout.
    pub async fn acquire(&self) -> Result<ConnectionLease, UpstreamError> {
        let shared = &self.shared;
        let permit = Arc::clone(&shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| UpstreamError::ShuttingDown)?;

        loop {
            let candidate = shared.idle().pop();
            let Some(mut conn) = candidate else { break };
            match tokio::time::timeout(shared.connect_timeout, conn.ready()).await {
                Ok(Ok(())) => {
                    tracing::trace!(connection_id = %conn.id(), "Reusing idle upstream connection");
                    return Ok(self.lease(conn, permit));
                }
                _ => shared.discard(conn, "stale"),
            }
        }

        let conn = tokio::time::timeout(shared.connect_timeout, UpstreamConnection::open(&shared.endpoint))
            .await
            .map_err(|_| UpstreamError::Timeout {
                phase: Phase::Connect,
                after: shared.connect_timeout,
            })??;
        shared.opened.fetch_add(1, Ordering::Relaxed);
        Ok(self.lease(conn, permit))
    }

    fn lease(&self, mut conn: UpstreamConnection, permit: OwnedSemaphorePermit) -> ConnectionLease {
        debug_assert_eq!(conn.state(), ConnectionState::Idle);
        conn.set_state(ConnectionState::InUse);
        ConnectionLease {
            id: conn.id(),
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            _permit: permit,
        }
    }

    pub fn status(&self) -> PoolStatus {
        let shared = &self.shared;
        let available = shared.permits.available_permits();
        PoolStatus {
            capacity: shared.capacity,
            available,
            in_use: shared.capacity.saturating_sub(available),
            idle: shared.idle().len(),
            opened_total: shared.opened.load(Ordering::Relaxed),
        }
    }

    /// Stop handing out leases and drop every idle connection.
    ///
    /// Waiters in `acquire` fail with `ShuttingDown`; outstanding leases
    /// discard their connection when they finish.
    pub fn close(&self) {
        self.shared.permits.close();
        let drained: Vec<_> = self.shared.idle().drain(..).collect();
        for conn in drained {
            self.shared.discard(conn, "pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.permits.is_closed()
    }
}

/// A connection borrowed from the pool for one exchange, plus its capacity permit.
///
/// `release` parks the connection for reuse; dropping the lease instead
/// discards it. Either way the permit returns to the pool exactly once.
#[derive(Debug)]
pub struct ConnectionLease {
    id: ConnectionId,
    conn: Option<UpstreamConnection>,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionLease {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// State of the leased connection; `Closed` once it has been given up.
    pub fn state(&self) -> ConnectionState {
        self.conn.as_ref().map_or(ConnectionState::Closed, UpstreamConnection::state)
    }

    pub(crate) async fn send_request(&mut self, request: Request<Body>) -> Result<Response<Incoming>, UpstreamError> {
        match self.conn.as_mut() {
            Some(conn) => conn.send(request).await.map_err(UpstreamError::protocol),
            None => Err(UpstreamError::Cancelled),
        }
    }

    /// Return the connection to the pool after a fully consumed exchange.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.park(conn);
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.discard(conn, "lease dropped before release");
        }
    }
}
