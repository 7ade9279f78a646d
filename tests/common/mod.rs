//! Shared utilities for handler and server tests.

#![allow(dead_code)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use http_decoy::flow::{ConnKey, FlowMetadata, FlowResolver};
use http_decoy::net::Connection;
use http_decoy::observability::{DecoyEvent, EventSink};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::Level;

/// In-memory connection that records writes and counts closes.
pub struct MockConn {
    input: Cursor<Vec<u8>>,
    remote: String,
    tap: ConnTap,
    fail_writes: bool,
    fail_close: bool,
}

/// Observer kept by the test after the connection is handed over.
#[derive(Clone, Default)]
pub struct ConnTap {
    written: Arc<Mutex<Vec<u8>>>,
    closes: Arc<AtomicUsize>,
}

impl ConnTap {
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl MockConn {
    pub fn new(input: impl Into<Vec<u8>>) -> (Self, ConnTap) {
        let tap = ConnTap::default();
        let conn = Self {
            input: Cursor::new(input.into()),
            remote: "203.0.113.50:52344".to_string(),
            tap: tap.clone(),
            fail_writes: false,
            fail_close: false,
        };
        (conn, tap)
    }

    pub fn with_remote(mut self, remote: &str) -> Self {
        self.remote = remote.to_string();
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

impl Connection for MockConn {
    fn remote_addr(&self) -> String {
        self.remote.clone()
    }
}

impl AsyncRead for MockConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().input).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockConn {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.fail_writes {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away")));
        }
        self.tap.written.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.tap.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "close failed")));
        }
        Poll::Ready(Ok(()))
    }
}

/// Sink that keeps every event for inspection.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DecoyEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<DecoyEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: Level) -> Vec<DecoyEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level() == level)
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().iter().map(DecoyEvent::message).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &DecoyEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Resolver returning fixed metadata and remembering what was asked.
#[derive(Default)]
pub struct StaticResolver {
    metadata: FlowMetadata,
    lookups: Mutex<Vec<ConnKey>>,
}

impl StaticResolver {
    pub fn new(target_port: u16) -> Self {
        Self {
            metadata: FlowMetadata { target_port },
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn lookups(&self) -> Vec<ConnKey> {
        self.lookups.lock().unwrap().clone()
    }
}

impl FlowResolver for StaticResolver {
    fn connection_by_flow(&self, key: &ConnKey) -> FlowMetadata {
        self.lookups.lock().unwrap().push(*key);
        self.metadata
    }
}
