//! Trust-on-first-use certificate store.
//!
//! # Data Flow
//! ```text
//! TLS handshake completes
//!     → identity.rs (parse leaf cert: common name, RSA key, expiration)
//!     → pkcs1.rs (canonical byte-comparable key encoding)
//!     → store.rs (lookup record by identity hash)
//!         Unknown  → store new key, proceed
//!         Trusted  → proceed
//!         Mismatch → prompt.rs (operator decision)
//!             yes → overwrite record, proceed
//!             no  → refuse the connection
//! ```
//!
//! # Design Decisions
//! - Keyed by certificate Common Name, not the connect hostname
//! - Records are plain text, no version tag; parse failure = no record
//! - Malformed records are deleted so the next handshake re-stores
//! - The prompt is a trait seam so unattended runs can predecide

use std::path::PathBuf;

use thiserror::Error;

pub mod identity;
pub mod pkcs1;
pub mod prompt;
pub mod store;

pub use identity::{multiline_summary, PeerCertificate};
pub use prompt::{FixedPrompt, PromptAnswer, StdinPrompt, TrustPrompt};
pub use store::{FileStore, TrustRecord};

/// Errors from the certificate trust layer.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Cache root exists but is not a directory.
    #[error("trust cache root {0} exists and is not a directory")]
    CacheRootNotDirectory(PathBuf),

    /// Peer presented no certificate chain.
    #[error("peer presented no certificate")]
    NoPeerCertificate,

    /// Leaf certificate is not parseable DER.
    #[error("malformed peer certificate: {0}")]
    CertificateParse(String),

    /// Peer key uses an algorithm other than RSA.
    #[error("unsupported peer key algorithm {0}, only RSA keys are accepted")]
    UnsupportedKeyAlgorithm(String),

    /// Certificate subject carries no Common Name to key the store by.
    #[error("peer certificate has no common name")]
    MissingCommonName,

    /// Reading or writing the trust cache failed.
    #[error("trust cache i/o error: {0}")]
    Cache(#[from] std::io::Error),

    /// The blocking confirmation task failed to complete.
    #[error("trust confirmation did not complete: {0}")]
    Interrupted(String),

    /// Operator declined (or could not confirm) a changed key.
    #[error("peer key for '{identity}' changed and the new key was not accepted")]
    Rejected { identity: String },
}

/// Convenience alias for trust-layer results.
pub type TrustResult<T> = Result<T, TrustError>;

/// Outcome of comparing a presented key against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Stored key matches the presented key byte for byte.
    Trusted,
    /// No usable record exists for the identity.
    Unknown,
    /// A record exists and its key differs.
    Mismatch,
}

/// Persistence seam for peer public keys.
///
/// `note_commitment` mirrors engines that can pin a hashed key without
/// the full key material; stores that only track full keys keep it a
/// no-op.
pub trait PubkeyStore: Send + Sync {
    /// Persist `key` for `identity`, replacing any existing record.
    fn store(&self, identity: &str, key: &[u8], expires_unix: i64) -> TrustResult<()>;

    /// Compare `key` against the record for `identity`.
    fn verify(&self, identity: &str, key: &[u8]) -> TrustResult<VerifyOutcome>;

    /// Record that a key was observed without trusting it.
    fn note_commitment(&self, _identity: &str, _key: &[u8]) -> TrustResult<()> {
        Ok(())
    }
}

/// Decide whether a handshake may proceed with the presented certificate.
///
/// First sight of an identity stores its key and proceeds. A matching key
/// proceeds with no side effect. A differing key asks the operator: `yes`
/// replaces the record, anything else refuses the connection and leaves
/// the stored key untouched.
pub fn confirm_peer_trust(
    store: &dyn PubkeyStore,
    prompt: &dyn TrustPrompt,
    cert: &PeerCertificate,
) -> TrustResult<()> {
    let identity = cert.common_name();
    let key = cert.public_key();

    match store.verify(identity, key)? {
        VerifyOutcome::Trusted => {
            tracing::debug!(identity = %identity, "Peer key matches stored key");
            Ok(())
        }
        VerifyOutcome::Unknown => {
            store.store(identity, key, cert.expires_unix())?;
            tracing::info!(identity = %identity, "Trusting peer key on first use");
            Ok(())
        }
        VerifyOutcome::Mismatch => {
            tracing::warn!(
                identity = %identity,
                "Peer key differs from the stored key, asking the operator"
            );
            let summary = multiline_summary(cert.summary());
            match prompt.confirm_key_change(identity, &summary) {
                Some(PromptAnswer::Yes) => {
                    store.store(identity, key, cert.expires_unix())?;
                    tracing::info!(identity = %identity, "Operator accepted the changed peer key");
                    Ok(())
                }
                Some(PromptAnswer::No) | None => Err(TrustError::Rejected {
                    identity: identity.to_owned(),
                }),
            }
        }
    }
}
