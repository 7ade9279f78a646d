//! Forensic events emitted by the decoy handler.
//!
//! Field names are an external contract: log pipelines key on `handler`,
//! `dest_port`, `src_ip`, `src_port`, `path`, `method`, `query` and
//! `payload_hex`. Renaming any of them breaks downstream tooling.

use tracing::Level;

/// Value of the `handler` field on every event.
pub const HANDLER_TAG: &str = "http";

/// One structured log record produced while handling a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoyEvent {
    /// The request head was decoded and the flow resolved.
    RequestHandled {
        method: String,
        path: String,
        query: String,
        dest_port: u16,
        src_ip: String,
        src_port: String,
    },
    /// ASCII rendering of the request head (debug only).
    RequestDump { dump: String },
    /// The declared body was captured in full.
    BodyPayload { payload_hex: String },
    /// The raw request-target mentioned a wallet.
    WalletRequest,
    /// A failure on any path, carrying the raw error text only.
    Error { error: String },
}

impl DecoyEvent {
    pub fn error(err: &dyn std::error::Error) -> Self {
        DecoyEvent::Error {
            error: err.to_string(),
        }
    }

    pub fn level(&self) -> Level {
        match self {
            DecoyEvent::RequestDump { .. } => Level::DEBUG,
            DecoyEvent::Error { .. } => Level::ERROR,
            _ => Level::INFO,
        }
    }

    pub fn message(&self) -> String {
        match self {
            DecoyEvent::RequestHandled { method, path, .. } => {
                format!("HTTP {method} request handled: {path}")
            }
            DecoyEvent::RequestDump { .. } => "HTTP request dump".to_string(),
            DecoyEvent::BodyPayload { .. } => "HTTP body payload".to_string(),
            DecoyEvent::WalletRequest => "HTTP wallet request".to_string(),
            DecoyEvent::Error { .. } => "HTTP handler error".to_string(),
        }
    }

    /// Field mapping as seen by a string-keyed log sink, `handler` first.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("handler", HANDLER_TAG.to_string())];
        match self {
            DecoyEvent::RequestHandled {
                method,
                path,
                query,
                dest_port,
                src_ip,
                src_port,
            } => {
                fields.extend([
                    ("dest_port", dest_port.to_string()),
                    ("src_ip", src_ip.clone()),
                    ("src_port", src_port.clone()),
                    ("path", path.clone()),
                    ("method", method.clone()),
                    ("query", query.clone()),
                ]);
            }
            DecoyEvent::RequestDump { dump } => fields.push(("dump", dump.clone())),
            DecoyEvent::BodyPayload { payload_hex } => {
                fields.push(("payload_hex", payload_hex.clone()))
            }
            DecoyEvent::WalletRequest => {}
            DecoyEvent::Error { error } => fields.push(("error", error.clone())),
        }
        fields
    }

    /// Look up one field by name.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields()
            .into_iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

/// Destination for decoy events.
///
/// Emission is fire-and-forget: a sink must not block the handler beyond its
/// own contract and is never retried.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DecoyEvent);
}

/// Sink that forwards every event to the `tracing` dispatcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &DecoyEvent) {
        let message = event.message();
        match event {
            DecoyEvent::RequestHandled {
                method,
                path,
                query,
                dest_port,
                src_ip,
                src_port,
            } => tracing::info!(
                handler = HANDLER_TAG,
                dest_port = %dest_port,
                src_ip = %src_ip,
                src_port = %src_port,
                path = %path,
                method = %method,
                query = %query,
                "{message}"
            ),
            DecoyEvent::RequestDump { dump } => {
                tracing::debug!(handler = HANDLER_TAG, dump = %dump, "{message}")
            }
            DecoyEvent::BodyPayload { payload_hex } => {
                tracing::info!(handler = HANDLER_TAG, payload_hex = %payload_hex, "{message}")
            }
            DecoyEvent::WalletRequest => tracing::info!(handler = HANDLER_TAG, "{message}"),
            DecoyEvent::Error { error } => {
                tracing::error!(handler = HANDLER_TAG, error = %error, "{message}")
            }
        }
    }
}
