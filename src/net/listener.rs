//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to every configured decoy address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via a semaphore shared by all ports
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to parse or bind the address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    /// Failed to accept connection.
    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),
    /// The connection limit semaphore was closed.
    #[error("connection limit closed")]
    LimitClosed(#[from] AcquireError),
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Several listeners can share one semaphore, so `max_connections` is a
/// process-wide budget rather than a per-port one.
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind to `address`, drawing connection slots from `connection_limit`.
    pub async fn bind(address: &str, connection_limit: Arc<Semaphore>) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            address: address.to_string(),
            source,
        };
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| bind_err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let inner = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(
            address = %local_addr,
            available_permits = connection_limit.available_permits(),
            "Decoy listener bound"
        );

        Ok(Self {
            inner,
            connection_limit,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// This will wait if the connection limit has been reached.
    /// Returns the stream and a permit that must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire permit first (backpressure)
        let permit = Arc::clone(&self.connection_limit).acquire_owned().await?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool, even if
/// the connection task panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
