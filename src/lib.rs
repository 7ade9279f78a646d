//! HTTP decoy responder library.

pub mod config;
pub mod flow;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::DecoyConfig;
pub use flow::{ConnKey, FlowMetadata, FlowResolver, FlowTable};
pub use http::{DecoyError, DecoyHandler, DecoyServer};
pub use lifecycle::Shutdown;
pub use net::Connection;
pub use observability::{DecoyEvent, EventSink, TracingSink};
