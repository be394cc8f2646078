//! Transport and trust layer for a remote-display protocol client.
//!
//! Owns the TCP connection to the server, upgrades it to TLS, and decides
//! through a trust-on-first-use store whether the peer's key should be
//! trusted. The protocol layer above consumes plain decrypted bytes.

pub mod buffer;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod trust;

pub use config::ViewlinkConfig;
pub use lifecycle::Shutdown;
pub use net::{Connection, TransportError};
