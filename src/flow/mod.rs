//! Flow metadata subsystem.
//!
//! # Data Flow
//! ```text
//! Host accepts connection
//!     → table.rs registers (peer ip, peer port) → FlowMetadata { target_port }
//!     → handler splits remote address, builds ConnKey
//!     → FlowResolver::connection_by_flow (never blocks, unknown → default)
//!     → registration guard drops when the connection task ends
//! ```
//!
//! The handler only sees the `FlowResolver` trait; any session tracker can
//! stand behind it.

pub mod table;

use std::fmt;
use std::net::{IpAddr, SocketAddr};

pub use table::{FlowRegistration, FlowTable};

/// Identity of a tracked flow: the remote endpoint of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnKey {
    ip: IpAddr,
    port: u16,
}

impl ConnKey {
    /// IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`, as seen on a dual-stack
    /// bind) are keyed by their IPv4 form, whichever way they were written.
    fn normalized(ip: IpAddr, port: u16) -> Self {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        Self { ip, port }
    }

    /// Build a key from the host and port strings of a split remote address.
    ///
    /// Returns `None` when either half is not numeric; such flows can never
    /// have been registered.
    pub fn from_parts(host: &str, port: &str) -> Option<Self> {
        let ip = host.parse().ok()?;
        let port = port.parse().ok()?;
        Some(Self::normalized(ip, port))
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for ConnKey {
    fn from(addr: SocketAddr) -> Self {
        Self::normalized(addr.ip(), addr.port())
    }
}

impl fmt::Display for ConnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SocketAddr::new(self.ip, self.port))
    }
}

/// Session-level facts about a connection, owned by the session tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowMetadata {
    /// Local port the peer originally connected to; 0 when unknown.
    pub target_port: u16,
}

/// Lookup of flow metadata by remote endpoint.
///
/// Implementations must return promptly and must not panic; an unknown flow
/// resolves to `FlowMetadata::default()`.
pub trait FlowResolver: Send + Sync {
    fn connection_by_flow(&self, key: &ConnKey) -> FlowMetadata;
}
