//! Connection abstraction and lifecycle tracking.
//!
//! # Responsibilities
//! - Define the byte stream the decoy handler consumes (`Connection`)
//! - Split a remote address into host and port strings
//! - Generate unique connection IDs for tracing
//! - Track in-flight connections for graceful shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// A raw inbound connection handed to the decoy for one exchange.
///
/// Closing is `AsyncWriteExt::shutdown` followed by drop; the handler owns the
/// value and performs both.
pub trait Connection: AsyncRead + AsyncWrite + Unpin + Send {
    /// Remote endpoint as `host:port` text. An empty string means unknown.
    fn remote_addr(&self) -> String;
}

impl Connection for TcpStream {
    fn remote_addr(&self) -> String {
        self.peer_addr().map(|addr| addr.to_string()).unwrap_or_default()
    }
}

/// Failure to split a remote address into host and port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("address {0}: missing port in address")]
    MissingPort(String),
    #[error("address {0}: too many colons in address")]
    TooManyColons(String),
    #[error("address {0}: missing ']' in address")]
    MissingBracket(String),
    #[error("address {0}: unexpected bracket in address")]
    UnexpectedBracket(String),
}

/// Split `host:port`, `[host]:port` or `[host%zone]:port` into its parts.
///
/// The host of a bracketed address is returned without brackets. No name or
/// number validation is done on either half.
pub fn split_host_port(addr: &str) -> Result<(&str, &str), AddrError> {
    let missing_port = || AddrError::MissingPort(addr.to_string());
    let too_many_colons = || AddrError::TooManyColons(addr.to_string());

    let colon = addr.rfind(':').ok_or_else(missing_port)?;

    // `open` and `close` bound the region that must not contain stray brackets.
    let (host, open, close) = if addr.starts_with('[') {
        let end = addr
            .find(']')
            .ok_or_else(|| AddrError::MissingBracket(addr.to_string()))?;
        let after = end + 1;
        if after == addr.len() {
            return Err(missing_port());
        }
        if after != colon {
            return Err(if addr.as_bytes()[after] == b':' {
                too_many_colons()
            } else {
                missing_port()
            });
        }
        (&addr[1..end], 1, after)
    } else {
        let host = &addr[..colon];
        if host.contains(':') {
            return Err(too_many_colons());
        }
        (host, 0, 0)
    };

    if addr[open..].contains('[') || addr[close..].contains(']') {
        return Err(AddrError::UnexpectedBracket(addr.to_string()));
    }

    Ok((host, &addr[colon + 1..]))
}

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient: only uniqueness is needed.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
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

/// Tracks in-flight connections so shutdown can drain them.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        crate::observability::metrics::record_active_connections(active);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or `grace` elapses.
    ///
    /// Returns the number of connections still open when waiting stopped.
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
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        crate::observability::metrics::record_active_connections(active);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
