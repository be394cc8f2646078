//! Shared utilities for the transport and trust integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Plaintext echo server on a loopback port. Echoes every connection
/// until the peer closes.
#[allow(dead_code)]
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// Server that accepts connections but never sends or reads anything.
#[allow(dead_code)]
pub async fn spawn_silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            held.push(socket);
        }
    });

    addr
}

/// TLS echo server presenting the given certificate and key.
#[allow(dead_code)]
pub async fn spawn_tls_echo_server(
    cert: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
) -> SocketAddr {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut stream) = acceptor.accept(socket).await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// A self-signed server identity for handshake tests.
#[allow(dead_code)]
pub struct TestIdentity {
    pub cert: CertificateDer<'static>,
    key_pkcs8: Vec<u8>,
    /// The certificate key in the canonical comparison encoding the
    /// trust store uses.
    pub public_key_pkcs1: Vec<u8>,
}

#[allow(dead_code)]
impl TestIdentity {
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivatePkcs8KeyDer::from(self.key_pkcs8.clone()).into()
    }
}

// RSA keygen is expensive, so the two key pairs the suite needs are
// generated once and shared across tests.
static RSA_KEYS: [OnceLock<(Vec<u8>, Vec<u8>, Vec<u8>)>; 2] = [OnceLock::new(), OnceLock::new()];

fn rsa_key_material(index: usize) -> &'static (Vec<u8>, Vec<u8>, Vec<u8>) {
    RSA_KEYS[index].get_or_init(|| {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pkcs8 = key.to_pkcs8_der().unwrap().as_bytes().to_vec();
        (pkcs8, key.n().to_bytes_be(), key.e().to_bytes_be())
    })
}

/// Self-signed RSA certificate for `cn`. `key_index` selects which of
/// the suite's key pairs signs it, so tests can present the same
/// identity with a different key.
#[allow(dead_code)]
pub fn rsa_identity(cn: &str, key_index: usize) -> TestIdentity {
    let (pkcs8, modulus, exponent) = rsa_key_material(key_index);
    let key_pair = rcgen::KeyPair::try_from(pkcs8.as_slice()).unwrap();

    let mut params = rcgen::CertificateParams::new(vec![cn.to_owned()]).unwrap();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, cn);
    let cert = params.self_signed(&key_pair).unwrap();

    TestIdentity {
        cert: cert.der().clone(),
        key_pkcs8: pkcs8.clone(),
        public_key_pkcs1: viewlink::trust::pkcs1::encode_rsa_public_key(modulus, exponent),
    }
}

/// Self-signed ECDSA certificate for `cn`, for the unsupported-algorithm
/// path.
#[allow(dead_code)]
pub fn ecdsa_identity(cn: &str) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let key_pair = rcgen::KeyPair::generate().unwrap();

    let mut params = rcgen::CertificateParams::new(vec![cn.to_owned()]).unwrap();
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, cn);
    let cert = params.self_signed(&key_pair).unwrap();

    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der()).into();
    (cert.der().clone(), key)
}
