//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection on a decoy port
//!     → listener.rs (accept loop, shared connection limit)
//!     → connection.rs (tracking, connection id)
//!     → Hand off to the HTTP decoy handler as a `Connection`
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - The handler sees only the `Connection` trait, never a concrete socket

pub mod connection;
pub mod listener;

pub use connection::{split_host_port, AddrError, Connection, ConnectionTracker};
pub use listener::{Listener, ListenerError};
