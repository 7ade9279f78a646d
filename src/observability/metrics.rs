//! Metrics collection and exposition.
//!
//! # Metrics
//! - `decoy_connections_total` (counter): connections handed to the handler, by listener port
//! - `decoy_requests_total` (counter): exchanges by outcome
//! - `decoy_wallet_probes_total` (counter): wallet-probe responses sent
//! - `decoy_body_bytes_total` (counter): captured body bytes
//! - `decoy_active_connections` (gauge): in-flight connections
//!
//! Recording is a no-op until `init_metrics` installs the Prometheus recorder.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection(port: u16) {
    metrics::counter!("decoy_connections_total", "port" => port.to_string()).increment(1);
}

/// `outcome` is one of `ok`, `framing`, `addressing`, `body_read`, `write`, `timeout`.
pub fn record_request(outcome: &'static str) {
    metrics::counter!("decoy_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_wallet_probe() {
    metrics::counter!("decoy_wallet_probes_total").increment(1);
}

pub fn record_body_bytes(len: usize) {
    metrics::counter!("decoy_body_bytes_total").increment(len as u64);
}

pub fn record_active_connections(active: u64) {
    metrics::gauge!("decoy_active_connections").set(active as f64);
}
