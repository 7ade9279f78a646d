//! Canned decoy responses.
//!
//! Bytes are fixed and written verbatim; scanners fingerprint on them, so
//! they must not be regenerated from a template.

use crate::http::request::DecodedRequest;

/// Minimal success with no headers and no body.
pub const GENERIC_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";

/// Success carrying a JSON account list for wallet scanners. The declared
/// length does not match the payload; it is kept as deployed.
pub const WALLET_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length:20\r\n\r\n[[\"\"]]\r\n\r\n";

/// Substring of the raw request-target that marks a wallet probe.
pub const WALLET_MARKER: &str = "wallet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoyResponse {
    Generic,
    WalletProbe,
}

impl DecoyResponse {
    /// Pick the response for a request. Matching is case-sensitive on the
    /// target as sent, before any decoding.
    pub fn select(request: &DecodedRequest) -> Self {
        if request.raw_target().contains(WALLET_MARKER) {
            DecoyResponse::WalletProbe
        } else {
            DecoyResponse::Generic
        }
    }

    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            DecoyResponse::Generic => GENERIC_RESPONSE,
            DecoyResponse::WalletProbe => WALLET_RESPONSE,
        }
    }

    pub fn is_wallet_probe(self) -> bool {
        self == DecoyResponse::WalletProbe
    }
}
