//! In-memory cache of unwrapped data-encryption keys.
//!
//! Entries are keyed by `(keyring, key id)` and evicted by TTL or, when the
//! cache is full, least-recently-used first. Every entry that leaves the cache
//! (expiry, capacity eviction, replacement, clear) has its key bytes zeroized
//! before it is released.
//!
//! The cache is a pure optimization: a miss only costs a storage read and an
//! unwrap.

use std::num::NonZeroUsize;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::debug;
use zeroize::Zeroize;

use strongbox_crypto::SymmetricKey;

use crate::clock::Clock;

/// `(keyring, key id)`.
type CacheKey = (String, String);

struct Entry {
    key: SymmetricKey,
    inserted_at: Instant,
}

/// Bounded, time-bounded cache of unwrapped DEKs.
pub struct KeyCache {
    /// `None` when the capacity is zero.
    inner: Mutex<Option<LruCache<CacheKey, Entry>>>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    #[cfg(test)]
    scrubbed: AtomicUsize,
}

impl KeyCache {
    /// Creates a cache holding at most `capacity` keys for at most `ttl` each.
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(NonZeroUsize::new(capacity).map(LruCache::new)),
            capacity,
            ttl,
            clock,
            #[cfg(test)]
            scrubbed: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<LruCache<CacheKey, Entry>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) >= self.ttl
    }

    /// Zeroizes an entry leaving the cache.
    fn scrub(&self, mut entry: Entry) {
        entry.key.zeroize();
        #[cfg(test)]
        self.scrubbed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a copy of the cached key, if present and not expired.
    pub fn get(&self, keyring: &str, key_id: &str) -> Option<SymmetricKey> {
        let key = (keyring.to_string(), key_id.to_string());
        let now = self.clock.now();
        let mut guard = self.lock();
        let lru = guard.as_mut()?;

        if self.expired(lru.peek(&key)?, now) {
            if let Some(entry) = lru.pop(&key) {
                self.scrub(entry);
            }
            debug!(keyring = %keyring, key_id = %key_id, "Cached key expired");
            return None;
        }

        lru.get(&key).map(|entry| entry.key.clone())
    }

    /// Inserts or replaces a key, evicting the least-recently-used entry if full.
    pub fn put(&self, keyring: &str, key_id: &str, value: SymmetricKey) {
        let entry = Entry {
            key: value,
            inserted_at: self.clock.now(),
        };
        let mut guard = self.lock();
        let Some(lru) = guard.as_mut() else {
            self.scrub(entry);
            return;
        };

        // Either the replaced value or the evicted LRU entry.
        if let Some((_, removed)) = lru.push((keyring.to_string(), key_id.to_string()), entry) {
            self.scrub(removed);
        }
    }

    /// Drops every expired entry and returns how many were scrubbed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut guard = self.lock();
        let Some(lru) = guard.as_mut() else {
            return 0;
        };

        let expired: Vec<CacheKey> = lru
            .iter()
            .filter(|(_, entry)| self.expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = lru.pop(key) {
                self.scrub(entry);
            }
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired keys evicted from cache");
        }

        expired.len()
    }

    /// Removes and scrubs every entry.
    pub fn clear(&self) {
        let mut guard = self.lock();
        if let Some(lru) = guard.as_mut() {
            while let Some((_, entry)) = lru.pop_lru() {
                self.scrub(entry);
            }
        }
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().as_ref().map_or(0, LruCache::len)
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}
