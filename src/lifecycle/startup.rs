//! Startup orchestration.
//!
//! # Order
//! 1. Metrics exporter (if enabled)
//! 2. Config watcher (if a config file was given)
//! 3. Listeners bound, all or nothing
//! 4. Signal handler wired to the shutdown broadcast
//! 5. Serve, then drain in-flight exchanges within the grace period
//!
//! Any failure before step 5 is fatal.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::DecoyConfig;
use crate::http::DecoyServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::wait_for_signal;
use crate::net::ListenerError;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A config file to watch, with its contents as loaded at startup.
///
/// `loaded` is the file alone, before any command-line override, so that
/// reloads are compared against what the file said.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    pub path: PathBuf,
    pub loaded: DecoyConfig,
}

/// Run the decoy until a termination signal arrives.
pub async fn run(config: DecoyConfig, watched: Option<WatchedFile>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    // The watcher handle must outlive the server for updates to keep flowing.
    let (_watcher, config_updates) = match watched {
        Some(WatchedFile { path, loaded }) => {
            let (watcher, updates) = ConfigWatcher::new(&path, loaded);
            (Some(watcher.run()?), updates)
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let grace = Duration::from_secs(config.timeouts.shutdown_grace_secs);
    let server = DecoyServer::new(config);
    let listeners = server.bind().await?;
    let tracker = server.tracker();
    let flows = server.flows();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let signal_task = tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => tracing::info!(signal = name, "Termination signal received"),
            Err(e) => tracing::error!(error = %e, "Signal handler failed, shutting down"),
        }
        shutdown.trigger();
    });

    let served = server.run(listeners, config_updates, server_shutdown).await;
    signal_task.abort();

    let remaining = tracker.wait_for_drain(grace).await;
    if remaining > 0 {
        tracing::warn!(
            remaining,
            open_flows = flows.len(),
            "Grace period elapsed with exchanges still open"
        );
    }

    served.map_err(StartupError::from)
}
