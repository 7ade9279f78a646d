//! The HTTP decoy handler.
//!
//! # Exchange
//! ```text
//! Start → Parsed → MetadataResolved → Logged → [BodyCaptured] → [Dumped]
//!       → ResponseSelected → Written → Closed
//!
//! Any failure → error event → Closed
//! ```
//!
//! The connection is owned by `handle` and shut down exactly once after the
//! exchange, whichever state it stopped in. If the future is dropped or a
//! sink panics, dropping the connection closes it instead.

use std::io;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use crate::config::HandlerConfig;
use crate::flow::{ConnKey, FlowResolver};
use crate::http::error::DecoyError;
use crate::http::request::{DecodedRequest, RequestReader};
use crate::http::response::DecoyResponse;
use crate::net::{split_host_port, Connection};
use crate::observability::{DecoyEvent, EventSink};

/// Summary of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub method: String,
    pub response: DecoyResponse,
    /// Captured body bytes; 0 when no body was declared.
    pub body_len: usize,
}

/// Impersonates an HTTP server for one connection at a time.
///
/// Holds no per-connection state; one handler may serve any number of
/// connections concurrently.
#[derive(Clone)]
pub struct DecoyHandler {
    resolver: Arc<dyn FlowResolver>,
    sink: Arc<dyn EventSink>,
    config: HandlerConfig,
}

impl DecoyHandler {
    pub fn new(resolver: Arc<dyn FlowResolver>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            resolver,
            sink,
            config: HandlerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve one request on `conn`, then close it.
    ///
    /// Every failure is emitted as an error event before being returned. A
    /// failed close is emitted too but never replaces the exchange result.
    pub async fn handle<C: Connection>(&self, mut conn: C) -> Result<Exchange, DecoyError> {
        let result = self.exchange(&mut conn).await;
        if let Err(e) = &result {
            self.sink.emit(&DecoyEvent::error(e));
        }

        match conn.shutdown().await {
            Ok(()) => {}
            // The peer already tore the connection down.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => self.sink.emit(&DecoyEvent::error(&e)),
        }
        drop(conn);

        result
    }

    async fn exchange<C: Connection>(&self, conn: &mut C) -> Result<Exchange, DecoyError> {
        let remote = conn.remote_addr();

        let mut reader = RequestReader::new(conn, &self.config);
        let request = reader.read_head().await?;

        let (src_ip, src_port) = split_host_port(&remote)?;
        let metadata = ConnKey::from_parts(src_ip, src_port)
            .map(|key| self.resolver.connection_by_flow(&key))
            .unwrap_or_default();

        self.sink.emit(&DecoyEvent::RequestHandled {
            method: request.method().to_string(),
            path: request.uri().escaped_path(),
            query: request.uri().encoded_query(),
            dest_port: metadata.target_port,
            src_ip: src_ip.to_string(),
            src_port: src_port.to_string(),
        });

        let body = self.capture_body(&request, reader).await?;
        if self.config.dump_requests {
            self.sink.emit(&DecoyEvent::RequestDump {
                dump: request.dump(&body),
            });
        }

        let response = DecoyResponse::select(&request);
        if response.is_wallet_probe() {
            self.sink.emit(&DecoyEvent::WalletRequest);
        }

        conn.write_all(response.as_bytes())
            .await
            .map_err(DecoyError::Write)?;
        conn.flush().await.map_err(DecoyError::Write)?;

        Ok(Exchange {
            method: request.method().to_string(),
            response,
            body_len: body.len(),
        })
    }

    /// Read and log the declared body, if any. The reader is consumed here
    /// so the body stream is released on every outcome.
    async fn capture_body<C: Connection>(
        &self,
        request: &DecodedRequest,
        reader: RequestReader<'_, C>,
    ) -> Result<Vec<u8>, DecoyError> {
        let declared = request.content_length();
        if declared == 0 {
            return Ok(Vec::new());
        }
        if declared > self.config.max_body_bytes {
            return Err(DecoyError::BodyTooLarge {
                declared,
                limit: self.config.max_body_bytes,
            });
        }

        let body = reader.read_body(declared).await.map_err(DecoyError::BodyRead)?;
        self.sink.emit(&DecoyEvent::BodyPayload {
            payload_hex: hex::encode(&body),
        });
        Ok(body)
    }
}
