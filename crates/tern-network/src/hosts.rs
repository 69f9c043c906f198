//! Host directory: candidate peer addresses for dialing.
//!
//! Bootstraps from the configured seed names (resolved lazily via DNS) and
//! grows from `addr` gossip harvested by the address-exchange protocol.
//! `fetch_address` hands out candidates round-robin so repeated dial
//! attempts rotate through everything known.

use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::net::lookup_host;
use tracing::{debug, warn};

use tern_core::error::NetworkError;

/// Shared, mutable set of known peer addresses.
pub struct HostPool {
    seeds: Vec<String>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<SocketAddr>,
    known: HashSet<SocketAddr>,
}

impl HostPool {
    pub fn new(seeds: Vec<String>) -> Self {
        Self { seeds, inner: Mutex::new(Inner::default()) }
    }

    /// Number of addresses currently known.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("host pool lock").queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add addresses to the directory, skipping ones already known.
    pub fn insert<I>(&self, addresses: I)
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let mut inner = self.inner.lock().expect("host pool lock");
        for address in addresses {
            if inner.known.insert(address) {
                inner.queue.push_back(address);
            }
        }
    }

    /// Yield the next dial candidate, resolving seeds on first use (and
    /// again whenever the directory has gone empty).
    pub async fn fetch_address(&self) -> Result<SocketAddr, NetworkError> {
        if let Some(address) = self.rotate() {
            return Ok(address);
        }

        self.resolve_seeds().await;

        self.rotate().ok_or(NetworkError::NoAddresses)
    }

    /// Pop the front candidate and push it to the back.
    fn rotate(&self) -> Option<SocketAddr> {
        let mut inner = self.inner.lock().expect("host pool lock");
        let address = inner.queue.pop_front()?;
        inner.queue.push_back(address);
        Some(address)
    }

    async fn resolve_seeds(&self) {
        for seed in &self.seeds {
            match lookup_host(seed.as_str()).await {
                Ok(addresses) => {
                    let resolved: Vec<SocketAddr> = addresses.collect();
                    debug!(seed = %seed, count = resolved.len(), "resolved seed");
                    self.insert(resolved);
                }
                Err(e) => {
                    warn!(seed = %seed, error = %e, "seed resolution failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last_octet: u8) -> SocketAddr {
        format!("10.0.0.{last_octet}:8333").parse().unwrap()
    }

    #[tokio::test]
    async fn fetch_rotates_round_robin() {
        let pool = HostPool::new(vec![]);
        pool.insert([addr(1), addr(2)]);

        let a = pool.fetch_address().await.unwrap();
        let b = pool.fetch_address().await.unwrap();
        let c = pool.fetch_address().await.unwrap();
        assert_eq!(a, addr(1));
        assert_eq!(b, addr(2));
        assert_eq!(c, addr(1));
    }

    #[tokio::test]
    async fn duplicates_are_ignored() {
        let pool = HostPool::new(vec![]);
        pool.insert([addr(1), addr(1), addr(1)]);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn empty_pool_without_seeds_errors() {
        let pool = HostPool::new(vec![]);
        assert_eq!(
            pool.fetch_address().await.unwrap_err(),
            NetworkError::NoAddresses
        );
    }

    #[tokio::test]
    async fn literal_seed_resolves_without_dns() {
        let pool = HostPool::new(vec!["127.0.0.1:18444".to_string()]);
        let address = pool.fetch_address().await.unwrap();
        assert_eq!(address, "127.0.0.1:18444".parse().unwrap());
    }
}
