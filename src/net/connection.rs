//! Connection context and lifecycle.
//!
//! # Responsibilities
//! - Open the socket, trying each resolved candidate in order
//! - Tune socket options (no-delay, receive-buffer floor)
//! - Own the buffers, the address cache, and the latched error flag
//! - Upgrade the raw socket to TLS and gate it through the trust store
//!
//! All state lives on the [`Connection`] value; there are no process-wide
//! singletons. The exclusive borrow on `send`/`receive` serializes I/O,
//! and an auxiliary producer fills pool buffers through the shared
//! [`BufferPool`] handle before handing them to the connection owner.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::watch;

use crate::buffer::{BufferPool, PooledBuffer, StreamBuffer};
use crate::config::TransportConfig;
use crate::lifecycle::Shutdown;
use crate::net::io::{receive_exact, send_all, ActiveTransport};
use crate::net::resolver::{self, AddressCache, ServerAddress};
use crate::net::tls;
use crate::net::{TransportError, TransportResult};
use crate::trust::{confirm_peer_trust, PubkeyStore, TrustPrompt};

/// A client connection to the remote-display server.
///
/// Created once and reused across reconnects so the resolved address
/// survives; dropping it closes the socket without a close-notify, so
/// callers that upgraded to TLS should [`Connection::disconnect`] first.
pub struct Connection {
    config: TransportConfig,
    transport: Option<ActiveTransport>,
    addresses: AddressCache,
    inbound: StreamBuffer,
    outbound: Arc<BufferPool>,
    /// Latched by fatal transport errors; cleared only by `connect`.
    network_error: bool,
    /// Keeps the signal's sender side alive for the connection's lifetime.
    shutdown: Shutdown,
    exit: watch::Receiver<bool>,
    peer_public_key: Option<Vec<u8>>,
}

impl Connection {
    /// Create an unconnected context.
    ///
    /// `shutdown` is the exit signal that aborts in-flight receives.
    pub fn new(config: TransportConfig, shutdown: &Shutdown) -> Self {
        let outbound = Arc::new(BufferPool::new(
            config.pool_slots(),
            config.initial_buffer_capacity,
        ));
        let inbound = StreamBuffer::new(config.initial_buffer_capacity);
        Self {
            config,
            transport: None,
            addresses: AddressCache::new(),
            inbound,
            outbound,
            network_error: false,
            shutdown: shutdown.clone(),
            exit: shutdown.subscribe(),
            peer_public_key: None,
        }
    }

    /// The exit signal this connection observes.
    pub fn shutdown_handle(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Connect to `hostname` on the configured or a caller-chosen port.
    ///
    /// Reconnecting to the hostname of the previous successful connect
    /// reuses its resolved address instead of resolving again, so a
    /// redirected reconnect lands on the same host even behind
    /// round-robin DNS. Candidates are tried in resolver order; the
    /// attempt fails only after all of them refused.
    pub async fn connect(&mut self, hostname: &str, port: Option<u16>) -> TransportResult<()> {
        let port = port.unwrap_or(self.config.port);

        let candidates = match self.addresses.cached(hostname, port) {
            Some(addr) => {
                tracing::debug!(hostname = %hostname, addr = %addr, "Reusing resolved address");
                vec![addr]
            }
            None => resolver::resolve(hostname, port).await?,
        };

        let mut last_error = None;
        for addr in candidates {
            match open_socket(addr, self.config.receive_buffer_floor).await {
                Ok(stream) => {
                    self.addresses.remember(hostname, addr);
                    self.transport = Some(ActiveTransport::Plain(stream));
                    self.inbound = StreamBuffer::new(self.config.initial_buffer_capacity);
                    self.outbound = Arc::new(BufferPool::new(
                        self.config.pool_slots(),
                        self.config.initial_buffer_capacity,
                    ));
                    self.network_error = false;
                    self.peer_public_key = None;
                    tracing::info!(hostname = %hostname, addr = %addr, "Connected");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(addr = %addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(TransportError::Connect {
            hostname: hostname.to_owned(),
            source: last_error.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no candidate addresses")
            }),
        })
    }

    /// Close the connection.
    ///
    /// Sends a TLS close-notify when the record layer is active, then
    /// closes the socket and empties the buffers (memory is retained).
    /// Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            // For TLS this drives close-notify; errors at this point
            // cannot be acted on.
            let _ = transport.shutdown().await;
            tracing::debug!("Disconnected");
        }
        self.inbound.reset();
        self.outbound.reset_all();
        self.peer_public_key = None;
    }

    /// Empty the logical content of all buffers without touching the
    /// socket or releasing memory. Used when the protocol layer
    /// resynchronizes mid-session, e.g. on a session-directory redirect.
    pub fn reset_state(&mut self) {
        self.inbound.reset();
        self.outbound.reset_all();
    }

    /// Whether a live peer is attached.
    pub fn is_connected(&self) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| t.peer_addr().is_ok())
    }

    /// Local address of the connected socket, if any.
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.transport.as_ref()?.local_addr().ok()
    }

    /// The endpoint of the last successful connect, if any.
    pub fn server_address(&self) -> Option<&ServerAddress> {
        self.addresses.last()
    }

    /// Whether the TLS record layer is active.
    pub fn is_tls(&self) -> bool {
        self.transport.as_ref().is_some_and(ActiveTransport::is_tls)
    }

    /// Shared handle to the outbound pool, for a producer that fills
    /// buffers on another task.
    pub fn outbound_pool(&self) -> Arc<BufferPool> {
        Arc::clone(&self.outbound)
    }

    /// Check out an outbound buffer from the pool.
    pub fn acquire_outbound(&self) -> PooledBuffer {
        self.outbound.acquire()
    }

    /// Canonical public key of the TLS peer, present once a handshake
    /// passed the trust gate.
    pub fn peer_public_key(&self) -> Option<&[u8]> {
        self.peer_public_key.as_deref()
    }

    /// Transmit all of `bytes`, or fail.
    ///
    /// Stalls are retried internally with a bounded writability poll; a
    /// fatal transport error latches the connection as failed, and all
    /// later I/O short-circuits until the next `connect`. Never reports
    /// a partial send.
    pub async fn send(&mut self, bytes: &[u8]) -> TransportResult<()> {
        if self.network_error {
            return Err(TransportError::NetworkFailed);
        }
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;

        let result = send_all(transport, bytes, self.config.write_poll_interval()).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!(error = %e, "Fatal send error, latching connection as failed");
                self.network_error = true;
            }
        }
        result
    }

    /// Transmit the unread content of a pooled buffer, then recycle it.
    pub async fn send_buffer(&mut self, buffer: PooledBuffer) -> TransportResult<()> {
        let result = self.send_slice_of(&buffer).await;
        self.outbound.recycle(buffer);
        result
    }

    async fn send_slice_of(&mut self, buffer: &PooledBuffer) -> TransportResult<()> {
        if self.network_error {
            return Err(TransportError::NetworkFailed);
        }
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;

        let interval = self.config.write_poll_interval();
        let result = send_all(transport, buffer.remaining(), interval).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!(error = %e, "Fatal send error, latching connection as failed");
                self.network_error = true;
            }
        }
        result
    }

    /// Receive exactly `length` bytes into the connection's inbound
    /// buffer, which is reset first and grows to fit the largest message
    /// seen. Returns the received bytes.
    pub async fn receive(&mut self, length: usize) -> TransportResult<&[u8]> {
        if self.network_error {
            return Err(TransportError::NetworkFailed);
        }
        self.inbound.reset();

        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;
        let result = receive_exact(transport, &mut self.inbound, length, &mut self.exit).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!(error = %e, "Fatal receive error, latching connection as failed");
                self.network_error = true;
            }
        }
        result?;
        Ok(self.inbound.filled())
    }

    /// Receive exactly `length` bytes appended after `dest`'s current
    /// end, growing it while preserving content and cursor offsets.
    pub async fn receive_into(
        &mut self,
        dest: &mut StreamBuffer,
        length: usize,
    ) -> TransportResult<()> {
        if self.network_error {
            return Err(TransportError::NetworkFailed);
        }
        let transport = self.transport.as_mut().ok_or(TransportError::NotConnected)?;

        let result = receive_exact(transport, dest, length, &mut self.exit).await;
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::error!(error = %e, "Fatal receive error, latching connection as failed");
                self.network_error = true;
            }
        }
        result
    }

    /// Upgrade the raw socket to TLS and run the trust gate.
    ///
    /// On handshake success, the peer's leaf certificate is parsed, its
    /// RSA key canonicalized, and the trust store consulted; a mismatch
    /// asks `prompt` (off the async runtime, since it may block on the
    /// operator). Any failure tears the session down and leaves the
    /// connection closed — terminal for this attempt, the caller decides
    /// whether to reconnect from scratch. Calling on an already-upgraded
    /// connection is a no-op.
    pub async fn tls_upgrade(
        &mut self,
        store: Arc<dyn PubkeyStore>,
        prompt: Arc<dyn TrustPrompt>,
    ) -> TransportResult<()> {
        if self.network_error {
            return Err(TransportError::NetworkFailed);
        }
        let hostname = self
            .addresses
            .last()
            .ok_or(TransportError::NotConnected)?
            .hostname()
            .to_owned();
        let socket = match self.transport.take() {
            Some(ActiveTransport::Plain(socket)) => socket,
            Some(tls @ ActiveTransport::Tls(_)) => {
                self.transport = Some(tls);
                return Ok(());
            }
            None => return Err(TransportError::NotConnected),
        };

        // Dropping the socket on any failure below is the teardown: the
        // half-open session is never reattached.
        let stream = tls::handshake(socket, &hostname, self.config.handshake_timeout()).await?;
        let cert = tls::peer_certificate(&stream)?;

        let (outcome, cert) = tokio::task::spawn_blocking(move || {
            let outcome = confirm_peer_trust(store.as_ref(), prompt.as_ref(), &cert);
            (outcome, cert)
        })
        .await
        .map_err(|e| crate::trust::TrustError::Interrupted(e.to_string()))?;
        outcome?;

        self.peer_public_key = Some(cert.public_key().to_vec());
        self.transport = Some(ActiveTransport::Tls(Box::new(stream)));
        tracing::info!(identity = %cert.common_name(), "TLS session trusted");
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.is_connected())
            .field("tls", &self.is_tls())
            .field("server", &self.addresses.last())
            .field("network_error", &self.network_error)
            .finish_non_exhaustive()
    }
}

/// Open and tune a socket for one candidate address.
///
/// The kernel receive buffer is raised to `recv_floor` when the default
/// is smaller; no-delay is enabled once connected.
async fn open_socket(addr: SocketAddr, recv_floor: u32) -> std::io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if socket.recv_buffer_size()? < recv_floor {
        socket.set_recv_buffer_size(recv_floor)?;
    }

    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
