//! Peer identity and metadata extracted from the leaf certificate.
//!
//! The trust store is keyed by the certificate's Common Name rather than
//! the hostname the socket connected to: with tunnels and jump proxies the
//! network endpoint can be unrelated to the authenticated identity.

use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::trust::pkcs1;
use crate::trust::{TrustError, TrustResult};

/// Fields of the peer's leaf certificate that the trust layer cares about.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    common_name: String,
    public_key: Vec<u8>,
    expires_unix: i64,
    summary: String,
}

impl PeerCertificate {
    /// Parse a DER-encoded certificate.
    ///
    /// Fails on malformed DER, on a missing Common Name, and on any public
    /// key algorithm other than RSA. The key is canonicalized to PKCS#1
    /// `RSAPublicKey` DER so it can be compared byte-wise across sessions.
    pub fn parse(der: &[u8]) -> TrustResult<Self> {
        let (_, cert) = parse_x509_certificate(der)
            .map_err(|e| TrustError::CertificateParse(e.to_string()))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_owned)
            .ok_or(TrustError::MissingCommonName)?;

        let public_key = match cert.public_key().parsed() {
            Ok(PublicKey::RSA(rsa)) => pkcs1::encode_rsa_public_key(rsa.modulus, rsa.exponent),
            Ok(_) => {
                return Err(TrustError::UnsupportedKeyAlgorithm(
                    cert.public_key().algorithm.algorithm.to_string(),
                ))
            }
            Err(e) => return Err(TrustError::CertificateParse(e.to_string())),
        };

        let validity = cert.validity();
        let summary = format!(
            "subject `{}', issuer `{}', serial {}, activated `{}', expires `{}'",
            cert.subject(),
            cert.issuer(),
            cert.raw_serial_as_string(),
            validity.not_before,
            validity.not_after,
        );

        Ok(Self {
            common_name,
            public_key,
            expires_unix: validity.not_after.timestamp(),
            summary,
        })
    }

    /// Common Name from the subject DN; the trust-store lookup key.
    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    /// Canonical PKCS#1 DER of the RSA public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Certificate expiration as a unix timestamp.
    pub fn expires_unix(&self) -> i64 {
        self.expires_unix
    }

    /// One-line, comma-separated summary of the certificate.
    pub fn summary(&self) -> &str {
        &self.summary
    }
}

/// Re-render a comma-separated certificate summary one field per line.
pub fn multiline_summary(summary: &str) -> String {
    summary
        .split(',')
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;
    use rsa::traits::PublicKeyParts;

    fn self_signed(cn: &str, key_pair: &rcgen::KeyPair) -> Vec<u8> {
        let mut params = rcgen::CertificateParams::new(vec![cn.to_owned()]).unwrap();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, cn);
        params.self_signed(key_pair).unwrap().der().to_vec()
    }

    #[test]
    fn parse_extracts_cn_and_canonical_rsa_key() {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pkcs8 = key.to_pkcs8_der().unwrap();
        let key_pair = rcgen::KeyPair::try_from(pkcs8.as_bytes()).unwrap();
        let der = self_signed("server.example.com", &key_pair);

        let cert = PeerCertificate::parse(&der).unwrap();
        assert_eq!(cert.common_name(), "server.example.com");
        assert_eq!(
            cert.public_key(),
            pkcs1::encode_rsa_public_key(&key.n().to_bytes_be(), &key.e().to_bytes_be())
        );
        assert!(cert.expires_unix() > 0);
        assert!(cert.summary().contains("server.example.com"));
    }

    #[test]
    fn non_rsa_key_is_a_hard_failure() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let der = self_signed("ecdsa.example.com", &key_pair);

        match PeerCertificate::parse(&der) {
            Err(TrustError::UnsupportedKeyAlgorithm(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn garbage_der_is_a_parse_error() {
        match PeerCertificate::parse(b"not a certificate") {
            Err(TrustError::CertificateParse(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn multiline_summary_splits_on_commas() {
        let oneline = "subject `CN=a, O=b', serial 01:02, expires `later'";
        assert_eq!(
            multiline_summary(oneline),
            "subject `CN=a\nO=b'\nserial 01:02\nexpires `later'"
        );
    }

    #[test]
    fn multiline_summary_leaves_plain_text_alone() {
        assert_eq!(multiline_summary("no commas here"), "no commas here");
    }
}
