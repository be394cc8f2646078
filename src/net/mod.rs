//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! connect(hostname)
//!     → resolver.rs (candidate addresses, reconnect cache)
//!     → connection.rs (socket setup, buffers, lifecycle)
//!     → tls.rs (optional TLS handshake + trust gate)
//!     → io.rs (send/receive loops over the active transport)
//!     → Decrypted bytes handed to the protocol layer
//! ```
//!
//! # Design Decisions
//! - One connection context object, no ambient globals
//! - A fatal transport error latches until the next connect
//! - TLS is optional and dispatched transparently in the I/O loops

use std::time::Duration;

use thiserror::Error;

use crate::trust::TrustError;

pub mod connection;
pub mod io;
pub mod resolver;
pub mod tls;

pub use connection::Connection;
pub use resolver::ServerAddress;

/// Errors from the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Hostname resolved to no usable address.
    #[error("unable to resolve hostname '{hostname}': {source}")]
    Resolve {
        hostname: String,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate address refused the connection.
    #[error("unable to connect to '{hostname}': {source}")]
    Connect {
        hostname: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation issued with no live connection.
    #[error("not connected")]
    NotConnected,

    /// A previous fatal error latched the connection as failed.
    #[error("connection is in a failed state, reconnect to recover")]
    NetworkFailed,

    /// The transport reported an unrecoverable error.
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection mid-read.
    #[error("connection closed by peer")]
    PeerClosed,

    /// The exit signal aborted an in-flight receive.
    #[error("receive aborted by shutdown signal")]
    Cancelled,

    /// The TLS handshake failed fatally.
    #[error("TLS handshake failed: {0}")]
    Handshake(std::io::Error),

    /// The TLS handshake exceeded its deadline.
    #[error("TLS handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    /// The peer's certificate was refused by the trust layer.
    #[error(transparent)]
    Trust(#[from] TrustError),
}

impl TransportError {
    /// Whether this error must latch the connection as failed.
    ///
    /// Cancellation and pre-transport failures (resolution, connect,
    /// calling into a missing transport) leave connection state alone;
    /// everything that reached the wire and failed latches.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::PeerClosed)
    }
}

/// Convenience alias for transport-layer results.
pub type TransportResult<T> = Result<T, TransportError>;
