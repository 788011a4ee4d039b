//! In-memory map with per-entry expiry.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Longest gap between two expiry sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A thread-safe map whose entries expire after a fixed lifetime.
///
/// Expired entries are dropped on read, by [`TtlCache::purge_expired`], and
/// by a sweep that runs on insert at most once per `min(ttl, 60s)`. When
/// `max_entries` is set and the map is full, inserting first purges expired
/// entries and then evicts the entry closest to expiry.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
    max_entries: Option<usize>,
    next_sweep: Mutex<Instant>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: None,
            next_sweep: Mutex::new(Instant::now() + ttl.min(MAX_SWEEP_INTERVAL)),
        }
    }

    /// Bound the number of live entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max.max(1));
        self
    }

    /// Default lifetime of an entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a live entry, removing it if it has expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert with the default lifetime.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Insert with an explicit lifetime. Replaces any existing entry.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        {
            let mut next_sweep = self.next_sweep.lock();
            if now >= *next_sweep {
                entries.retain(|_, e| e.expires_at > now);
                *next_sweep = now + self.ttl.min(MAX_SWEEP_INTERVAL);
            }
        }

        if let Some(max) = self.max_entries
            && entries.len() >= max
            && !entries.contains_key(&key)
        {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= max
                && let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }

    /// Remove an entry.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key).map(|e| e.value)
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, including any not yet purged.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
