//! Eviction candidate sampling.
//!
//! Draws a bounded set of keys from the keyspace and orders it for the
//! configured policy. The sample size is a cap, not a floor: a smaller
//! keyspace yields a smaller sample. Sampling replaces any global
//! ordering structure — approximate LRU/LFU comes from sorting just the
//! drawn candidates.

use ahash::AHashMap;
use rand::seq::IteratorRandom;

use crate::item::Item;
use crate::keyspace::EvictionPolicy;

/// A sampled key with the ordering fields captured at draw time.
#[derive(Debug)]
pub(crate) struct Candidate {
    pub key: Box<str>,
    pub last_access_ms: u64,
    pub accesses: u64,
}

/// Draws up to `cap` candidates, skipping `exclude` when present.
pub(crate) fn draw(
    entries: &AHashMap<Box<str>, Item>,
    cap: usize,
    exclude: Option<&str>,
) -> Vec<Candidate> {
    let mut rng = rand::rng();
    entries
        .iter()
        .filter(|(key, _)| exclude != Some(&***key))
        .choose_multiple(&mut rng, cap)
        .into_iter()
        .map(|(key, item)| Candidate {
            key: key.clone(),
            last_access_ms: item.last_access_ms(),
            accesses: item.accesses(),
        })
        .collect()
}

/// Orders candidates so the first element is the preferred victim.
///
/// LRU evicts the oldest last-access first; LFU evicts the lowest
/// access count first; random keeps the sample order.
pub(crate) fn order_for(policy: EvictionPolicy, candidates: &mut [Candidate]) {
    match policy {
        EvictionPolicy::NoEviction | EvictionPolicy::AllKeysRandom => {}
        EvictionPolicy::AllKeysLru => {
            candidates.sort_by_key(|c| c.last_access_ms);
        }
        EvictionPolicy::AllKeysLfu => {
            candidates.sort_by_key(|c| c.accesses);
        }
    }
}
