//! TLS session establishment and peer inspection.
//!
//! # Responsibilities
//! - Install the process-wide crypto provider exactly once
//! - Run the client handshake with a bounded timeout
//! - Surface the peer's leaf certificate for the trust gate
//!
//! Certificate chains are deliberately not validated against a CA root:
//! the verifier accepts any chain, and trust is decided after the
//! handshake by comparing the peer's key against the on-disk store.

use std::io;
use std::sync::{Arc, Once};
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::ring;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::net::{TransportError, TransportResult};
use crate::trust::{PeerCertificate, TrustError, TrustResult};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider as the process default. Idempotent;
/// every call after the first is a no-op.
fn init_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = ring::default_provider().install_default();
    });
}

/// Accepts whatever certificate the server presents.
///
/// Chain validation is intentionally skipped; the TOFU store decides
/// trust from the peer key once the handshake is done.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Run the client handshake over a connected socket.
///
/// Consumes the socket; on failure it is dropped, which tears the
/// connection down. Returns the established stream with the record layer
/// active.
pub(crate) async fn handshake(
    socket: TcpStream,
    hostname: &str,
    timeout: Duration,
) -> TransportResult<TlsStream<TcpStream>> {
    init_crypto();

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(hostname.to_owned())
        .map_err(|e| TransportError::Handshake(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    let stream = time::timeout(timeout, connector.connect(server_name, socket))
        .await
        .map_err(|_| TransportError::HandshakeTimeout(timeout))?
        .map_err(TransportError::Handshake)?;

    let (_, session) = stream.get_ref();
    tracing::debug!(
        version = ?session.protocol_version(),
        cipher_suite = ?session.negotiated_cipher_suite().map(|suite| suite.suite()),
        "TLS session established"
    );
    Ok(stream)
}

/// Parse the peer's leaf certificate out of an established session.
///
/// Fails when the peer presented no chain, and on any certificate the
/// trust layer cannot use (malformed DER, missing CN, non-RSA key).
pub(crate) fn peer_certificate(stream: &TlsStream<TcpStream>) -> TrustResult<PeerCertificate> {
    let (_, session) = stream.get_ref();
    let leaf = session
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or(TrustError::NoPeerCertificate)?;
    PeerCertificate::parse(leaf.as_ref())
}
