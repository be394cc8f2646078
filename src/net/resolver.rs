//! Server address resolution with reconnect caching.
//!
//! # Responsibilities
//! - Resolve hostnames to candidate socket addresses (IPv4 and IPv6)
//! - Remember the address that actually accepted a connection
//! - Skip re-resolution when reconnecting to the same hostname
//!
//! Skipping re-resolution matters against round-robin DNS farms: a
//! redirected reconnect must land on the host that issued the
//! redirection, not on whichever address the resolver rotates to next.

use std::io;
use std::net::SocketAddr;

use tokio::net::lookup_host;

use crate::net::{TransportError, TransportResult};

/// A resolved server endpoint, remembered across reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    hostname: String,
    addr: SocketAddr,
}

impl ServerAddress {
    /// Hostname as requested by the caller.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// The address that accepted the last connection.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Cache holding the address of the last successful connect.
#[derive(Debug, Default)]
pub struct AddressCache {
    last: Option<ServerAddress>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address to reuse, if the previous successful connect went to the
    /// same hostname on the same port.
    pub fn cached(&self, hostname: &str, port: u16) -> Option<SocketAddr> {
        self.last
            .as_ref()
            .filter(|server| server.hostname == hostname && server.addr.port() == port)
            .map(|server| server.addr)
    }

    /// Record the address that just accepted a connection.
    pub fn remember(&mut self, hostname: &str, addr: SocketAddr) {
        self.last = Some(ServerAddress {
            hostname: hostname.to_owned(),
            addr,
        });
    }

    /// The last successfully connected endpoint, if any.
    pub fn last(&self) -> Option<&ServerAddress> {
        self.last.as_ref()
    }
}

/// Resolve `hostname` to its candidate addresses, in resolver order.
pub async fn resolve(hostname: &str, port: u16) -> TransportResult<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = lookup_host((hostname, port))
        .await
        .map_err(|source| TransportError::Resolve {
            hostname: hostname.to_owned(),
            source,
        })?
        .collect();

    if candidates.is_empty() {
        return Err(TransportError::Resolve {
            hostname: hostname.to_owned(),
            source: io::Error::new(io::ErrorKind::NotFound, "resolved to no addresses"),
        });
    }

    tracing::debug!(
        hostname = %hostname,
        candidates = candidates.len(),
        "Resolved server address"
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn cache_hits_only_on_the_same_hostname() {
        let mut cache = AddressCache::new();
        assert_eq!(cache.cached("a.example.com", 3389), None);

        cache.remember("a.example.com", addr("192.0.2.1:3389"));
        assert_eq!(
            cache.cached("a.example.com", 3389),
            Some(addr("192.0.2.1:3389"))
        );
        assert_eq!(cache.cached("b.example.com", 3389), None);
    }

    #[test]
    fn cache_misses_on_a_different_port() {
        let mut cache = AddressCache::new();
        cache.remember("a.example.com", addr("192.0.2.1:3389"));

        assert_eq!(cache.cached("a.example.com", 3390), None);
        assert_eq!(
            cache.cached("a.example.com", 3389),
            Some(addr("192.0.2.1:3389"))
        );
    }

    #[test]
    fn remember_replaces_the_previous_endpoint() {
        let mut cache = AddressCache::new();
        cache.remember("a.example.com", addr("192.0.2.1:3389"));
        cache.remember("b.example.com", addr("192.0.2.2:3389"));

        assert_eq!(cache.cached("a.example.com", 3389), None);
        assert_eq!(
            cache.cached("b.example.com", 3389),
            Some(addr("192.0.2.2:3389"))
        );
    }

    #[tokio::test]
    async fn resolves_loopback_names() {
        let candidates = resolve("localhost", 3389).await.unwrap();
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|a| a.port() == 3389));
    }

    #[tokio::test]
    async fn resolves_literal_addresses_without_dns() {
        let candidates = resolve("127.0.0.1", 80).await.unwrap();
        assert_eq!(candidates, vec![addr("127.0.0.1:80")]);
    }

    #[tokio::test]
    async fn unresolvable_name_is_an_error() {
        let err = resolve("does-not-exist.invalid", 3389).await.unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }));
    }
}
