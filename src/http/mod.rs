//! HTTP decoy subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted TCP connection
//!     → server.rs (dispatch, flow registration, timeout)
//!     → handler.rs (one exchange per connection)
//!         → request.rs (decode head, read declared body)
//!         → uri.rs (escaped path, encoded query)
//!         → response.rs (generic or wallet-probe bytes)
//!     → connection shut down
//! ```

pub mod error;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;
pub mod uri;

pub use error::DecoyError;
pub use handler::{DecoyHandler, Exchange};
pub use request::{DecodedRequest, ParseError};
pub use response::DecoyResponse;
pub use server::DecoyServer;
