//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Decoy handler produces:
//!     → events.rs (DecoyEvent through an EventSink)
//!
//! Host produces:
//!     → metrics.rs (counters, gauges)
//!     → per-connection spans (connection id, peer)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{DecoyEvent, EventSink, TracingSink, HANDLER_TAG};
