//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! transport layer. All types derive Serde traits for deserialization from
//! config files.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::{AUX_POOL_SLOTS, DEFAULT_POOL_SLOTS};

/// Root configuration for the transport and trust layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ViewlinkConfig {
    /// Socket, buffer, and handshake settings.
    pub transport: TransportConfig,

    /// Trust store settings.
    pub trust: TrustConfig,
}

/// Socket, buffer, and handshake settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Server port used when the target carries no explicit port.
    pub port: u16,

    /// Ceiling on TLS handshake duration, in seconds.
    pub handshake_timeout_secs: u64,

    /// Writability poll interval while a send cannot make progress,
    /// in milliseconds.
    pub write_poll_interval_ms: u64,

    /// Initial capacity of the inbound buffer and each outbound pool
    /// buffer, in bytes.
    pub initial_buffer_capacity: usize,

    /// The kernel receive buffer is raised to at least this many bytes
    /// on connect.
    pub receive_buffer_floor: u32,

    /// Reserve outbound pool slots for an auxiliary redirection producer
    /// that sends concurrently with the main protocol.
    pub aux_redirection: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 3389,
            handshake_timeout_secs: 30,
            write_poll_interval_ms: 100,
            initial_buffer_capacity: 4096,
            receive_buffer_floor: 16 * 1024,
            aux_redirection: false,
        }
    }
}

impl TransportConfig {
    /// Handshake ceiling as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Writability poll interval as a [`Duration`].
    pub fn write_poll_interval(&self) -> Duration {
        Duration::from_millis(self.write_poll_interval_ms)
    }

    /// Number of outbound pool slots implied by `aux_redirection`.
    pub fn pool_slots(&self) -> usize {
        if self.aux_redirection {
            AUX_POOL_SLOTS
        } else {
            DEFAULT_POOL_SLOTS
        }
    }
}

/// Trust store settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Override for the trust cache directory. When unset, the cache
    /// lives at `~/.local/share/viewlink/certs`.
    pub cache_root: Option<PathBuf>,

    /// What to do when a stored peer key no longer matches.
    pub on_key_change: KeyChangePolicy,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            cache_root: None,
            on_key_change: KeyChangePolicy::Ask,
        }
    }
}

/// Decision policy for changed peer keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyChangePolicy {
    /// Ask the operator interactively.
    Ask,
    /// Accept and store the new key without asking.
    Accept,
    /// Refuse the connection without asking.
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_documented_defaults() {
        let config: ViewlinkConfig = toml::from_str("").unwrap();
        assert_eq!(config.transport.port, 3389);
        assert_eq!(config.transport.handshake_timeout_secs, 30);
        assert_eq!(config.transport.write_poll_interval_ms, 100);
        assert_eq!(config.transport.initial_buffer_capacity, 4096);
        assert_eq!(config.transport.receive_buffer_floor, 16 * 1024);
        assert!(!config.transport.aux_redirection);
        assert_eq!(config.trust.cache_root, None);
        assert_eq!(config.trust.on_key_change, KeyChangePolicy::Ask);
    }

    #[test]
    fn aux_redirection_selects_wider_pool() {
        let mut config = TransportConfig::default();
        assert_eq!(config.pool_slots(), DEFAULT_POOL_SLOTS);
        config.aux_redirection = true;
        assert_eq!(config.pool_slots(), AUX_POOL_SLOTS);
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let config: ViewlinkConfig = toml::from_str(
            r#"
            [transport]
            port = 13389
            aux_redirection = true

            [trust]
            on_key_change = "reject"
            "#,
        )
        .unwrap();
        assert_eq!(config.transport.port, 13389);
        assert!(config.transport.aux_redirection);
        assert_eq!(config.transport.handshake_timeout_secs, 30);
        assert_eq!(config.trust.on_key_change, KeyChangePolicy::Reject);
    }
}
