//! Error taxonomy of one decoy exchange.

use std::io;

use thiserror::Error;

use crate::http::request::ParseError;
use crate::net::AddrError;

/// Why an exchange ended without a response being delivered.
///
/// Every variant is scoped to a single connection; none is fatal to the
/// process and none is retried.
#[derive(Debug, Error)]
pub enum DecoyError {
    /// Malformed request line or headers, or an unreadable stream.
    #[error("failed to read HTTP request: {0}")]
    Framing(#[from] ParseError),

    /// Remote endpoint could not be split into host and port.
    #[error("failed to identify peer: {0}")]
    Addressing(#[from] AddrError),

    /// Declared body could not be read in full.
    #[error("failed to read HTTP body: {0}")]
    BodyRead(#[source] io::Error),

    /// Declared body is larger than the handler agrees to capture.
    #[error("declared body of {declared} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { declared: u64, limit: u64 },

    /// Response could not be delivered.
    #[error("failed to send HTTP response: {0}")]
    Write(#[source] io::Error),
}

impl DecoyError {
    /// Short label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            DecoyError::Framing(_) => "framing",
            DecoyError::Addressing(_) => "addressing",
            DecoyError::BodyRead(_) | DecoyError::BodyTooLarge { .. } => "body_read",
            DecoyError::Write(_) => "write",
        }
    }
}
