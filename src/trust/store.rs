//! File-backed store of trusted peer public keys.
//!
//! One file per identity under the cache root. The file name is the
//! SHA-256 of the identity in lowercase hex; the content is two text
//! lines: the certificate expiration as a decimal unix timestamp, then
//! the key in base64. There is no format version tag, so anything that
//! fails to parse is treated the same as a missing record and removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::trust::{PubkeyStore, TrustError, TrustResult, VerifyOutcome};

/// A parsed trust record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRecord {
    /// Certificate expiration, decimal unix seconds.
    pub expires_unix: i64,
    /// Stored public key bytes.
    pub key: Vec<u8>,
}

/// Trust store rooted at a directory on the local filesystem.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store rooted at `root`.
    ///
    /// Creates the directory (and parents) when absent. Fails when the
    /// path exists but is not a directory.
    pub fn open(root: impl Into<PathBuf>) -> TrustResult<Self> {
        let root = root.into();
        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(TrustError::CacheRootNotDirectory(root)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(&root)?,
            Err(e) => return Err(e.into()),
        }
        Ok(Self { root })
    }

    /// Default cache root: `<home>/.local/share/viewlink/certs`.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".local/share/viewlink/certs"))
    }

    /// Directory this store reads and writes.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache file for an identity: SHA-256 of the identity, lowercase hex.
    pub fn record_path(&self, identity: &str) -> PathBuf {
        let digest = Sha256::digest(identity.as_bytes());
        self.root.join(hex::encode(digest))
    }

    /// Read and parse the record for an identity.
    ///
    /// A record that exists but does not parse is removed and reported as
    /// absent, so a later store starts fresh.
    pub fn record(&self, identity: &str) -> Option<TrustRecord> {
        let path = self.record_path(identity);
        let raw = fs::read_to_string(&path).ok()?;
        match parse_record(&raw) {
            Some(record) => Some(record),
            None => {
                tracing::warn!(
                    path = %path.display(),
                    "Removing malformed trust record"
                );
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Remove the record for an identity. Returns whether one existed.
    pub fn remove(&self, identity: &str) -> TrustResult<bool> {
        match fs::remove_file(self.record_path(identity)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All parseable records, as `(file name, record)` sorted by file name.
    ///
    /// Identities are not recoverable from file names (the hash is one
    /// way); callers that need the identity must already know it.
    pub fn list(&self) -> TrustResult<Vec<(String, TrustRecord)>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let raw = match fs::read_to_string(entry.path()) {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            match parse_record(&raw) {
                Some(record) => records.push((name, record)),
                None => {
                    tracing::warn!(file = %name, "Skipping malformed trust record");
                }
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}

impl PubkeyStore for FileStore {
    fn store(&self, identity: &str, key: &[u8], expires_unix: i64) -> TrustResult<()> {
        let content = format!("{}\n{}\n", expires_unix, BASE64.encode(key));
        fs::write(self.record_path(identity), content)?;
        tracing::debug!(identity = %identity, "Stored peer public key");
        Ok(())
    }

    fn verify(&self, identity: &str, key: &[u8]) -> TrustResult<VerifyOutcome> {
        match self.record(identity) {
            None => Ok(VerifyOutcome::Unknown),
            Some(record) if record.key == key => Ok(VerifyOutcome::Trusted),
            Some(_) => Ok(VerifyOutcome::Mismatch),
        }
    }
}

/// Two newline-terminated lines: decimal expiration, base64 key.
fn parse_record(raw: &str) -> Option<TrustRecord> {
    let mut lines = raw.lines();
    let expires_unix = lines.next()?.trim().parse::<i64>().ok()?;
    let key = BASE64.decode(lines.next()?.trim()).ok()?;
    Some(TrustRecord { expires_unix, key })
}
