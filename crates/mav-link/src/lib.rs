//! mav-link: frame and link abstractions for MAVLink-style telemetry links
//!
//! This crate provides the wire-level message unit shared by every layer of the bridge,
//! plus a minimal link trait. The default build enables a `mock` loopback backend so that
//! binaries and tests run on any host without a vehicle attached.

mod types;
pub use types::{Framing, KindId, LinkInfo, MavHeader, ReceivedFrame, Timestamp, WireMessage};
pub use types::MAX_PAYLOAD_LEN;

mod error;
pub use error::{LinkError, Result};

mod traits;
pub use traits::Link;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockLink, MockLinkHandle};
