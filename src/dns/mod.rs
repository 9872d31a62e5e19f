//! Host resolution with a TTL cache

pub mod enumeration;

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use log::debug;
use tokio::net::lookup_host;
use tokio::sync::RwLock;

use crate::error::ScanError;

struct CacheEntry {
    addrs: Vec<IpAddr>,
    expires: Instant,
}

/// Hostname-to-addresses cache in front of the system resolver.
///
/// Concurrent lookups for the same host may race and resolve twice; the last
/// writer wins. Stale reads are impossible past `expires`, and failed
/// resolutions are never cached.
pub struct ResolverCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResolverCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `host` to its addresses. Literal IPs pass through untouched
    /// without contacting the resolver or the cache.
    pub async fn lookup(&self, host: &str) -> crate::Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        if let Some(addrs) = self.cached(host).await {
            return Ok(addrs);
        }

        let addrs = resolve(host).await?;
        debug!("resolved {host} to {} addresses", addrs.len());
        self.store(host, addrs.clone()).await;
        Ok(addrs)
    }

    async fn cached(&self, host: &str) -> Option<Vec<IpAddr>> {
        let entries = self.entries.read().await;
        let entry = entries.get(host)?;
        if Instant::now() >= entry.expires {
            return None;
        }
        Some(entry.addrs.clone())
    }

    async fn store(&self, host: &str, addrs: Vec<IpAddr>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            host.to_string(),
            CacheEntry {
                addrs,
                expires: Instant::now() + self.ttl,
            },
        );
    }
}

async fn resolve(host: &str) -> crate::Result<Vec<IpAddr>> {
    let socket_addrs = lookup_host((host, 0)).await.map_err(|e| ScanError::Resolve {
        host: host.to_string(),
        source: e,
    })?;

    let mut addrs: Vec<IpAddr> = Vec::new();
    for sa in socket_addrs {
        if !addrs.contains(&sa.ip()) {
            addrs.push(sa.ip());
        }
    }
    if addrs.is_empty() {
        return Err(ScanError::Resolve {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"),
        });
    }
    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn literal_ipv4_passes_through() {
        let cache = ResolverCache::new(Duration::from_secs(60));
        let addrs = cache.lookup("192.0.2.7").await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7))]);
    }

    #[tokio::test]
    async fn literal_ipv6_passes_through() {
        let cache = ResolverCache::new(Duration::from_secs(60));
        let addrs = cache.lookup("::1").await.unwrap();
        assert_eq!(addrs, vec![IpAddr::V6(Ipv6Addr::LOCALHOST)]);
    }

    #[tokio::test]
    async fn literals_are_not_cached() {
        let cache = ResolverCache::new(Duration::from_secs(60));
        cache.lookup("127.0.0.1").await.unwrap();
        assert!(cache.cached("127.0.0.1").await.is_none());
    }

    #[tokio::test]
    async fn fresh_entries_are_served_until_expiry() {
        let cache = ResolverCache::new(Duration::from_secs(60));
        let addrs = vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))];
        cache.store("db.internal", addrs.clone()).await;
        assert_eq!(cache.cached("db.internal").await, Some(addrs));
    }

    #[tokio::test]
    async fn expired_entries_are_not_served() {
        let cache = ResolverCache::new(Duration::ZERO);
        cache
            .store("db.internal", vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))])
            .await;
        assert!(cache.cached("db.internal").await.is_none());
    }
}
