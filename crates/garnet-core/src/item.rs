//! A single keyspace entry.
//!
//! The value is an immutable `Bytes` payload. Expiry and access
//! metadata are atomics: `get` runs under a shared lock, so touching
//! the last-access instant and bumping the access counter must not
//! require exclusive access. `EXPIRE` likewise stores the new instant
//! through the atomic rather than taking the write lock.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::time;

/// A value plus its expiry instant and access metadata.
#[derive(Debug)]
pub struct Item {
    value: Bytes,
    /// Absolute expiry in UNIX ms. [`time::NO_EXPIRY`] means never.
    expires_at_ms: AtomicU64,
    /// UNIX ms of the most recent read. 0 until first read.
    last_access_ms: AtomicU64,
    /// Number of successful reads.
    accesses: AtomicU64,
}

impl Item {
    /// Creates a fresh item with no expiry and zeroed access counters.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at_ms: AtomicU64::new(time::NO_EXPIRY),
            last_access_ms: AtomicU64::new(0),
            accesses: AtomicU64::new(0),
        }
    }

    /// Rebuilds an item from persisted fields.
    pub fn from_parts(value: Bytes, expires_at_ms: u64, last_access_ms: u64, accesses: u64) -> Self {
        Self {
            value,
            expires_at_ms: AtomicU64::new(expires_at_ms),
            last_access_ms: AtomicU64::new(last_access_ms),
            accesses: AtomicU64::new(accesses),
        }
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms.load(Ordering::Relaxed)
    }

    pub fn set_expiry(&self, at_ms: u64) {
        self.expires_at_ms.store(at_ms, Ordering::Relaxed);
    }

    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }

    /// Returns `true` if this item has passed its expiry instant.
    pub fn is_expired(&self) -> bool {
        time::is_expired(self.expires_at_ms())
    }

    /// Records a read: stamps the last-access instant and bumps the
    /// access counter.
    pub fn touch(&self) {
        self.last_access_ms.store(time::now_ms(), Ordering::Relaxed);
        self.accesses.fetch_add(1, Ordering::Relaxed);
    }
}

impl Clone for Item {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            expires_at_ms: AtomicU64::new(self.expires_at_ms()),
            last_access_ms: AtomicU64::new(self.last_access_ms()),
            accesses: AtomicU64::new(self.accesses()),
        }
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.expires_at_ms() == other.expires_at_ms()
            && self.last_access_ms() == other.last_access_ms()
            && self.accesses() == other.accesses()
    }
}

impl Eq for Item {}
