//! The keyspace: map of keys to items plus memory accounting.
//!
//! A `Keyspace` owns a flat `AHashMap<Box<str>, Item>` and handles get,
//! set, delete, existence checks, TTL management, and sampled eviction
//! under a configured memory budget. Expired keys are removed lazily:
//! `get`/`ttl` report the expiry through a shared borrow and the caller
//! re-enters through [`Keyspace::remove_expired`] with exclusive access.

use ahash::AHashMap;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

use crate::item::Item;
use crate::memory::{self, MemoryTracker};
use crate::pattern;
use crate::sample;
use crate::time;

/// What to do with writes once the memory budget is exceeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Fail the write.
    #[default]
    NoEviction,
    /// Evict sampled keys in sample order.
    AllKeysRandom,
    /// Evict the sampled key with the oldest last access first.
    AllKeysLru,
    /// Evict the sampled key with the fewest accesses first.
    AllKeysLfu,
}

/// Budget and eviction settings for a keyspace.
#[derive(Debug, Clone)]
pub struct KeyspaceConfig {
    /// Memory budget in bytes. `0` means unlimited.
    pub max_memory: i64,
    /// Policy once the budget is exceeded.
    pub eviction: EvictionPolicy,
    /// Cap on the number of eviction candidates drawn per attempt.
    pub mem_samples: usize,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            max_memory: 0,
            eviction: EvictionPolicy::NoEviction,
            mem_samples: 5,
        }
    }
}

/// The memory budget was reached and eviction was disabled or freed
/// too little.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("maximum memory reached")]
pub struct OutOfMemory;

/// Outcome of a read. `Expired` asks the caller to re-enter with
/// exclusive access and delete the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Bytes),
    Expired,
    Missing,
}

/// Outcome of a TTL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlStatus {
    /// Key does not exist.
    Missing,
    /// Key exists with no expiry set.
    NoExpiry,
    /// Key exists but its expiry has passed (or less than a whole
    /// second remains). The caller should delete it.
    Expired,
    /// Remaining whole seconds.
    Remaining(i64),
}

/// The core key-value store. Callers provide the locking.
#[derive(Debug, Default)]
pub struct Keyspace {
    entries: AHashMap<Box<str>, Item>,
    memory: MemoryTracker,
    config: KeyspaceConfig,
    /// Cumulative count of keys removed by lazy expiry.
    expired_total: u64,
    /// Cumulative count of keys removed by eviction.
    evicted_total: u64,
}

impl Keyspace {
    /// Creates an empty keyspace with no memory limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty keyspace with the given budget settings.
    pub fn with_config(config: KeyspaceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Looks up a key. A hit stamps the item's last-access instant and
    /// bumps its access counter through the per-item atomics.
    pub fn get(&self, key: &str) -> Lookup {
        match self.entries.get(key) {
            None => Lookup::Missing,
            Some(item) if item.is_expired() => Lookup::Expired,
            Some(item) => {
                item.touch();
                Lookup::Found(item.value().clone())
            }
        }
    }

    /// Removes a key reported as expired. Re-checks the deadline so a
    /// concurrent overwrite between the read and this call survives.
    /// Returns `true` if the key was removed.
    pub fn remove_expired(&mut self, key: &str) -> bool {
        let expired = self.entries.get(key).is_some_and(Item::is_expired);
        if expired && self.remove_entry(key) {
            self.expired_total += 1;
            return true;
        }
        false
    }

    /// Stores `value` under `key`, replacing any previous item. The new
    /// item starts with zeroed access counters and no expiry.
    ///
    /// With a budget configured, a write that would meet or exceed it
    /// triggers one round of sampled eviction; if the budget is still
    /// exceeded afterwards the write fails and the keyspace is left as
    /// it was.
    pub fn set(&mut self, key: &str, value: Bytes) -> Result<(), OutOfMemory> {
        let new_size = memory::entry_size(key, &value);

        // a replaced entry gives its bytes back before the budget check
        let old_size = self
            .entries
            .get(key)
            .map(|old| memory::entry_size(key, old.value()));
        if let Some(size) = old_size {
            self.memory.remove(size);
        }

        if self.config.max_memory > 0
            && self.memory.used() + new_size >= self.config.max_memory
        {
            let evicted = self.evict(new_size, Some(key));
            let still_over = self.memory.used() + new_size >= self.config.max_memory;
            if evicted.is_err() || still_over {
                // the old entry is still installed; restore its share
                if let Some(size) = old_size {
                    self.memory.add(size);
                }
                return Err(OutOfMemory);
            }
        }

        self.entries.insert(Box::from(key), Item::new(value));
        self.memory.add(new_size);
        Ok(())
    }

    /// One best-effort eviction round: draw a sample, order it for the
    /// policy, delete until the budget would admit `required` more
    /// bytes. The key being written is excluded from the sample so its
    /// accounting isn't unwound mid-replace.
    fn evict(&mut self, required: i64, skip: Option<&str>) -> Result<(), OutOfMemory> {
        if self.config.eviction == EvictionPolicy::NoEviction {
            return Err(OutOfMemory);
        }

        let mut candidates = sample::draw(&self.entries, self.config.mem_samples, skip);
        sample::order_for(self.config.eviction, &mut candidates);

        for victim in candidates {
            debug!(key = %victim.key, "evicting");
            if self.remove_entry(&victim.key) {
                self.evicted_total += 1;
            }
            if self.memory.used() + required < self.config.max_memory {
                break;
            }
        }
        Ok(())
    }

    /// Removes a key. Returns `true` if it existed. Never fails.
    pub fn del(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(item) => {
                self.memory.remove(memory::entry_size(key, item.value()));
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the key is present.
    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all keys matching the glob `pattern`. A malformed
    /// pattern skips the key rather than failing the request.
    pub fn keys(&self, pat: &str) -> Vec<String> {
        let mut matches = Vec::new();
        for key in self.entries.keys() {
            match pattern::matches(pat, key) {
                Ok(true) => matches.push(key.to_string()),
                Ok(false) => {}
                Err(_) => {
                    warn!(pattern = pat, key = %key, "bad key pattern, skipping");
                }
            }
        }
        matches
    }

    /// Drops every key and resets the memory counter. The peak stat
    /// survives.
    pub fn flush(&mut self) {
        self.entries = AHashMap::new();
        self.memory.reset();
    }

    /// Sets an absolute expiry `secs` seconds from now on an existing
    /// key. Returns `true` if the key was present.
    pub fn expire(&self, key: &str, secs: i64) -> bool {
        match self.entries.get(key) {
            Some(item) => {
                item.set_expiry(time::expiry_after_secs(secs));
                true
            }
            None => false,
        }
    }

    /// Queries the remaining time-to-live of a key.
    pub fn ttl(&self, key: &str) -> TtlStatus {
        let Some(item) = self.entries.get(key) else {
            return TtlStatus::Missing;
        };
        let at = item.expires_at_ms();
        if at == time::NO_EXPIRY {
            return TtlStatus::NoExpiry;
        }
        match time::remaining_secs(at) {
            Some(secs) if secs > 0 => TtlStatus::Remaining(secs as i64),
            _ => TtlStatus::Expired,
        }
    }

    /// Installs a recovered item, bypassing the budget check. Used when
    /// loading a snapshot at startup.
    pub fn restore(&mut self, key: &str, item: Item) {
        self.remove_entry(key);
        self.memory.add(memory::entry_size(key, item.value()));
        self.entries.insert(Box::from(key), item);
    }

    /// Iterates over all (key, item) pairs, e.g. to build a snapshot.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.entries.iter().map(|(k, v)| (&**k, v))
    }

    pub fn config(&self) -> &KeyspaceConfig {
        &self.config
    }

    /// Approximate bytes currently used.
    pub fn used_memory(&self) -> i64 {
        self.memory.used()
    }

    /// Highest usage ever observed.
    pub fn peak_memory(&self) -> i64 {
        self.memory.peak()
    }

    /// Keys removed by lazy expiry so far.
    pub fn expired_keys(&self) -> u64 {
        self.expired_total
    }

    /// Keys removed by eviction so far.
    pub fn evicted_keys(&self) -> u64 {
        self.evicted_total
    }
}
