//! Decoy host: accepts connections on every monitored port and dispatches
//! each one to the HTTP decoy handler.
//!
//! # Responsibilities
//! - Bind all configured decoy addresses behind one connection budget
//! - Register each accepted flow so the handler can resolve its target port
//! - Run one handler invocation per connection under the request timeout
//! - Swap in reloaded handler settings for new connections
//! - Stop accepting on shutdown and let in-flight exchanges drain

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::{DecoyConfig, HandlerConfig};
use crate::flow::{ConnKey, FlowMetadata, FlowTable};
use crate::http::handler::DecoyHandler;
use crate::net::listener::ConnectionPermit;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::{metrics, EventSink, TracingSink};

/// Multi-port host for the HTTP decoy.
pub struct DecoyServer {
    config: DecoyConfig,
    dispatcher: Dispatcher,
}

/// Everything an accept loop needs to hand a connection to the handler.
#[derive(Clone)]
struct Dispatcher {
    handler_config: Arc<ArcSwap<HandlerConfig>>,
    flows: Arc<FlowTable>,
    sink: Arc<dyn EventSink>,
    tracker: ConnectionTracker,
    request_timeout: Duration,
}

impl DecoyServer {
    /// Create a server that reports through `tracing`.
    pub fn new(config: DecoyConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a server that reports through a custom sink.
    pub fn with_sink(config: DecoyConfig, sink: Arc<dyn EventSink>) -> Self {
        let dispatcher = Dispatcher {
            handler_config: Arc::new(ArcSwap::from_pointee(config.handler.clone())),
            flows: Arc::new(FlowTable::new()),
            sink,
            tracker: ConnectionTracker::new(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };
        Self { config, dispatcher }
    }

    /// Bind every configured address. All listeners share one connection limit.
    pub async fn bind(&self) -> Result<Vec<Listener>, ListenerError> {
        let limit = Arc::new(Semaphore::new(self.config.listener.max_connections));
        let mut listeners = Vec::with_capacity(self.config.listener.bind_addresses.len());
        for address in &self.config.listener.bind_addresses {
            listeners.push(Listener::bind(address, Arc::clone(&limit)).await?);
        }
        Ok(listeners)
    }

    /// Flow table backing the handler's target-port lookups.
    pub fn flows(&self) -> Arc<FlowTable> {
        Arc::clone(&self.dispatcher.flows)
    }

    /// Tracker of in-flight connections, for draining after `run` returns.
    pub fn tracker(&self) -> ConnectionTracker {
        self.dispatcher.tracker.clone()
    }

    /// Serve until `shutdown` fires or every accept loop has stopped.
    ///
    /// Returns once accepting has stopped; exchanges already dispatched keep
    /// running and can be awaited through `tracker()`.
    pub async fn run(
        self,
        listeners: Vec<Listener>,
        mut config_updates: mpsc::UnboundedReceiver<DecoyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let mut accept_loops = JoinSet::new();
        for listener in listeners {
            let addr = listener.local_addr().map_err(ListenerError::Accept)?;
            tracing::info!(address = %addr, "Decoy listening");
            accept_loops.spawn(accept_loop(
                listener,
                addr,
                self.dispatcher.clone(),
                shutdown.resubscribe(),
            ));
        }

        let mut first_error = None;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                Some(new_config) = config_updates.recv() => {
                    self.dispatcher.handler_config.store(Arc::new(new_config.handler));
                    tracing::info!("Handler configuration reloaded");
                }
                finished = accept_loops.join_next() => match finished {
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        tracing::error!(error = %e, "Accept loop stopped");
                        first_error.get_or_insert(e);
                    }
                    Some(Err(e)) => tracing::error!(error = %e, "Accept loop panicked"),
                    None => break,
                },
            }
        }

        accept_loops.shutdown().await;
        tracing::info!(
            in_flight = self.dispatcher.tracker.active_count(),
            "Decoy stopped accepting"
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn accept_loop(
    listener: Listener,
    local_addr: SocketAddr,
    dispatcher: Dispatcher,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ListenerError> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => dispatcher.dispatch(stream, peer, local_addr.port(), permit),
                Err(ListenerError::Accept(e)) => {
                    // Usually descriptor exhaustion; back off instead of spinning.
                    tracing::warn!(address = %local_addr, error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Err(e) => return Err(e),
            },
        }
    }
}

impl Dispatcher {
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, local_port: u16, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let registration = self.flows.register(
            ConnKey::from(peer),
            FlowMetadata {
                target_port: local_port,
            },
        );
        metrics::record_connection(local_port);

        let handler = DecoyHandler::new(self.flows.clone(), Arc::clone(&self.sink))
            .with_config(HandlerConfig::clone(&self.handler_config.load()));
        let timeout = self.request_timeout;
        let span = tracing::info_span!("conn", id = %guard.id(), peer = %peer, port = local_port);

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                let _registration = registration;

                match tokio::time::timeout(timeout, handler.handle(stream)).await {
                    Ok(Ok(exchange)) => {
                        metrics::record_request("ok");
                        metrics::record_body_bytes(exchange.body_len);
                        if exchange.response.is_wallet_probe() {
                            metrics::record_wallet_probe();
                        }
                    }
                    Ok(Err(e)) => {
                        metrics::record_request(e.outcome());
                        tracing::debug!(error = %e, "Exchange failed");
                    }
                    Err(_) => {
                        metrics::record_request("timeout");
                        tracing::warn!(
                            timeout_secs = timeout.as_secs(),
                            "Exchange timed out, connection dropped"
                        );
                    }
                }
            }
            .instrument(span),
        );
    }
}
