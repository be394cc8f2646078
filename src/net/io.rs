//! Send and receive engine over the active transport.
//!
//! # Responsibilities
//! - Dispatch reads and writes to the raw socket or the TLS record layer
//! - Send loops: all bytes or a fatal error, never a partial send
//! - Receive loops: accumulate an exact length across fragmented reads
//! - Abort in-flight receives when the exit signal fires
//!
//! A send that cannot make progress waits out a short writability poll
//! and retries with nothing consumed. Receives suspend awaiting socket
//! readiness; when the TLS layer already holds decrypted plaintext the
//! read completes without touching the socket.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time;
use tokio_rustls::client::TlsStream;

use crate::buffer::StreamBuffer;
use crate::net::{TransportError, TransportResult};

/// The byte stream a connection currently runs on.
pub enum ActiveTransport {
    /// Raw TCP stream before any TLS upgrade.
    Plain(TcpStream),
    /// TLS record layer over the socket.
    Tls(Box<TlsStream<TcpStream>>),
}

impl ActiveTransport {
    /// Whether the TLS record layer is active.
    pub fn is_tls(&self) -> bool {
        matches!(self, ActiveTransport::Tls(_))
    }

    /// Local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            ActiveTransport::Plain(stream) => stream.local_addr(),
            ActiveTransport::Tls(stream) => stream.get_ref().0.local_addr(),
        }
    }

    /// Peer address of the underlying socket.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            ActiveTransport::Plain(stream) => stream.peer_addr(),
            ActiveTransport::Tls(stream) => stream.get_ref().0.peer_addr(),
        }
    }
}

impl AsyncRead for ActiveTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ActiveTransport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            ActiveTransport::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ActiveTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ActiveTransport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            ActiveTransport::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ActiveTransport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            ActiveTransport::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ActiveTransport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            ActiveTransport::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Write all of `bytes`, retrying through stalls.
///
/// A write that makes no progress within `write_poll_interval` is dropped
/// and reissued; the transport must not consume input on a pending poll,
/// which holds for sockets and for the TLS stream. Errors are fatal and
/// leave already-transmitted bytes unrecoverable.
pub(crate) async fn send_all<W>(
    transport: &mut W,
    bytes: &[u8],
    write_poll_interval: Duration,
) -> TransportResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sent = 0;
    while sent < bytes.len() {
        match time::timeout(write_poll_interval, transport.write(&bytes[sent..])).await {
            Ok(Ok(0)) => {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                )))
            }
            Ok(Ok(written)) => sent += written,
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Err(_) => {
                tracing::trace!(sent, total = bytes.len(), "Write stalled, polling again");
            }
        }
    }

    loop {
        match time::timeout(write_poll_interval, transport.flush()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Err(_) => {
                tracing::trace!("Flush stalled, polling again");
            }
        }
    }
}

/// Read exactly `length` bytes, appending after `buf`'s current end.
///
/// The buffer is grown up front so existing content and cursor offsets
/// survive. A fired exit signal aborts between reads, leaving the buffer
/// partially filled and not consumable; a closed signal source counts as
/// fired. A zero-length read means the peer closed the connection.
pub(crate) async fn receive_exact<R>(
    transport: &mut R,
    buf: &mut StreamBuffer,
    length: usize,
    exit: &mut watch::Receiver<bool>,
) -> TransportResult<()>
where
    R: AsyncRead + Unpin,
{
    let target = buf.end() + length;
    buf.ensure_capacity(target);

    while buf.end() < target {
        if *exit.borrow() {
            return Err(TransportError::Cancelled);
        }
        let read = tokio::select! {
            biased;
            _ = exit.changed() => return Err(TransportError::Cancelled),
            read = transport.read(buf.unfilled_to(target)) => read?,
        };
        if read == 0 {
            return Err(TransportError::PeerClosed);
        }
        buf.advance_end(read);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::Shutdown;

    /// Accepts at most `cap` bytes per write call.
    struct CappedWriter {
        cap: usize,
        calls: usize,
        data: Vec<u8>,
    }

    impl CappedWriter {
        fn new(cap: usize) -> Self {
            Self {
                cap,
                calls: 0,
                data: Vec::new(),
            }
        }
    }

    impl AsyncWrite for CappedWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.calls += 1;
            let n = buf.len().min(this.cap);
            this.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Stays pending (without waking) for the first `stalls` write polls.
    struct StallingWriter {
        stalls: usize,
        data: Vec<u8>,
    }

    impl AsyncWrite for StallingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            if this.stalls > 0 {
                this.stalls -= 1;
                return Poll::Pending;
            }
            this.data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn send_all_delivers_despite_partial_acceptance() {
        let payload = b"sixteen byte msg";
        let mut writer = CappedWriter::new(payload.len() / 2);

        send_all(&mut writer, payload, Duration::from_millis(100))
            .await
            .unwrap();

        assert_eq!(writer.data, payload);
        assert!(writer.calls >= 2);
    }

    #[tokio::test]
    async fn send_all_retries_through_unwritable_periods() {
        let payload = b"delayed payload";
        let mut writer = StallingWriter {
            stalls: 2,
            data: Vec::new(),
        };

        send_all(&mut writer, payload, Duration::from_millis(10))
            .await
            .unwrap();

        assert_eq!(writer.data, payload);
        assert_eq!(writer.stalls, 0);
    }

    #[tokio::test]
    async fn send_all_surfaces_write_errors() {
        struct BrokenWriter;
        impl AsyncWrite for BrokenWriter {
            fn poll_write(
                self: Pin<&mut Self>,
                _cx: &mut Context<'_>,
                _buf: &[u8],
            ) -> Poll<io::Result<usize>> {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
            }
            fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
            fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
                Poll::Ready(Ok(()))
            }
        }

        let err = send_all(&mut BrokenWriter, b"data", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn receive_exact_accumulates_across_fragmented_reads() {
        let (mut near, mut far) = tokio::io::duplex(8);
        let payload: Vec<u8> = (0..64u8).collect();
        let to_send = payload.clone();
        let writer = tokio::spawn(async move {
            far.write_all(&to_send).await.unwrap();
        });

        let shutdown = Shutdown::new();
        let mut exit = shutdown.subscribe();
        let mut buf = StreamBuffer::new(16);
        receive_exact(&mut near, &mut buf, payload.len(), &mut exit)
            .await
            .unwrap();

        assert_eq!(buf.filled(), &payload[..]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn receive_exact_appends_and_preserves_offsets() {
        let (mut near, mut far) = tokio::io::duplex(64);
        far.write_all(b"-tail024").await.unwrap();

        let shutdown = Shutdown::new();
        let mut exit = shutdown.subscribe();
        let mut buf = StreamBuffer::new(4);
        buf.append(b"head");
        buf.advance(2);

        receive_exact(&mut near, &mut buf, 8, &mut exit).await.unwrap();

        assert_eq!(buf.filled(), b"head-tail024");
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.remaining(), b"ad-tail024");
    }

    #[tokio::test]
    async fn receive_exact_zero_read_is_peer_closed() {
        let (mut near, far) = tokio::io::duplex(16);
        drop(far);

        let shutdown = Shutdown::new();
        let mut exit = shutdown.subscribe();
        let mut buf = StreamBuffer::new(16);
        let err = receive_exact(&mut near, &mut buf, 4, &mut exit)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::PeerClosed));
    }

    #[tokio::test]
    async fn receive_exact_aborts_when_exit_fires_mid_read() {
        let (mut near, _far) = tokio::io::duplex(16);
        let shutdown = Shutdown::new();
        let mut exit = shutdown.subscribe();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let mut buf = StreamBuffer::new(16);
        let err = receive_exact(&mut near, &mut buf, 4, &mut exit)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[tokio::test]
    async fn receive_exact_aborts_immediately_when_exit_already_fired() {
        let (mut near, mut far) = tokio::io::duplex(16);
        far.write_all(b"ready").await.unwrap();

        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut exit = shutdown.subscribe();

        let mut buf = StreamBuffer::new(16);
        let err = receive_exact(&mut near, &mut buf, 4, &mut exit)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
        assert_eq!(buf.end(), 0);
    }
}
