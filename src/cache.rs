//! Expiring record cache shared by the trust validator and discovery
//! service.
//!
//! Records are time-boxed: an entry written at `t` expires at `t + ttl`,
//! and expiry never slides on read. Expired entries are dropped lazily
//! when read and in bulk by a [`CacheSweeper`], so entries for OPs that
//! are never re-queried do not accumulate forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Cache occupancy counts for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Entries currently held, expired or not.
    pub total: usize,
    /// Entries past their expiry but not yet evicted.
    pub expired: usize,
}

/// Keyed store of time-boxed records.
///
/// Keys are OP entity identifiers. Each instance owns its own state, so
/// two validators (e.g. one per trust anchor) never share hidden entries.
#[derive(Debug)]
pub struct ExpiringCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> ExpiringCache<V> {
    /// Create an empty cache whose entries live for `ttl` after insertion.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get the unexpired record for `key`, evicting it lazily if its TTL
    /// has elapsed. Reading never extends an entry's lifetime.
    pub async fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry exists but expired; re-check under the write lock since
        // another task may have replaced it since the read.
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                debug!(key, "evicted expired cache entry on read");
                None
            }
            None => None,
        }
    }

    /// Store a record under `key`, overwriting any previous entry
    /// wholesale. The new entry expires `ttl` from now.
    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Utc::now()
                + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX),
        };
        let mut entries = self.entries.write().await;
        entries.insert(key.into(), entry);
    }

    /// Remove one entry. Returns whether it was present.
    pub async fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        entries.remove(key).is_some()
    }

    /// Drop every entry immediately.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Drop all expired entries. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Occupancy counts for diagnostics.
    pub async fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let entries = self.entries.read().await;
        CacheStats {
            total: entries.len(),
            expired: entries.values().filter(|e| e.expires_at <= now).count(),
        }
    }
}

/// Background task that sweeps a cache on a fixed interval, independent of
/// request traffic.
///
/// The task stops when [`stop`](CacheSweeper::stop) is called and is
/// aborted if the sweeper is dropped, so shutdown never blocks on it.
#[derive(Debug)]
pub struct CacheSweeper {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    /// Spawn a sweeper over `cache`, running every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<V>(cache: Arc<ExpiringCache<V>>, interval: Duration, label: &'static str) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so the cadence
            // starts one interval after construction.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if flag.load(Ordering::Relaxed) {
                    info!(cache = label, "sweeper shutdown requested, stopping");
                    break;
                }
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!(cache = label, removed, "swept expired cache entries");
                }
            }
        });
        Self { shutdown, handle }
    }

    /// Request the sweep loop to stop. Non-blocking; any in-progress tick
    /// is abandoned.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.handle.abort();
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
