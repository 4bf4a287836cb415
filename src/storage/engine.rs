//! Thread-Safe Storage Engine with Lazy Expiry
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are hashed onto a fixed set of shards, each
//!    behind its own `Mutex`, so unrelated keys do not contend.
//! 2. **One Critical Section per Operation**: `get` checks the deadline,
//!    evicts and clones the value while holding the shard lock; `set`
//!    replaces the whole entry under the same lock. Operations on one key are
//!    totally ordered.
//! 3. **Lazy Expiry**: An expired entry stays in memory until the next read
//!    of its key (or an optional sweep, see [`crate::storage::expiry`]).
//! 4. **Value and Deadline Together**: An [`Entry`] owns both, so a deadline
//!    can never outlive its value.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ Mutex   │ │ Mutex   │ │ Mutex   │ │ Mutex   │            │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are only ever taken inside these synchronous methods, never across
//! an `.await`, so no shard is locked while a socket write is pending.

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with an optional deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates an entry that expires `ttl` from now, or never.
    ///
    /// A TTL too large to represent as an `Instant` is treated as no expiry.
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Returns the remaining time to live, or None if no expiry.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

type Shard = Mutex<HashMap<Bytes, Entry>>;

/// The key-value store shared by every connection.
///
/// # Example
///
/// ```
/// use tidekv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set(
///     Bytes::from("session"),
///     Bytes::from("abc123"),
///     Some(Duration::from_secs(60)),
/// );
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: number of expired keys removed
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Mutex::new(HashMap::new())).collect();

        Self {
            shards,
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Locks the shard owning `key`.
    ///
    /// A panic elsewhere while holding the lock leaves the map itself intact
    /// (every mutation is a single insert or remove), so poisoning is ignored.
    #[inline]
    fn lock_shard(&self, key: &[u8]) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        lock(&self.shards[self.shard_index(key)])
    }

    /// Stores `value` under `key`, replacing any previous value and deadline.
    ///
    /// With `ttl = None` the key never expires, even if it had a TTL before.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.lock_shard(&key);
        data.insert(key, Entry::new(value, ttl)).is_none()
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired; an expired
    /// entry is removed before returning.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key, applying lazy expiry the same way as `get`.
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        let mut data = self.lock_shard(key);

        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Removes a key and its deadline.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was present.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.lock_shard(key).remove(key).is_some()
    }

    /// Number of entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| lock(shard).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Removes every expired entry, one shard lock at a time.
    ///
    /// # Returns
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = lock(shard);
            let now = Instant::now();
            let before = data.len();

            data.retain(|_, entry| !entry.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }
}

#[inline]
fn lock(shard: &Shard) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
    shard.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of entries currently stored
    pub keys: usize,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total expired entries removed
    pub expired: u64,
}
