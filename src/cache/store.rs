//! In-memory listing store.
//!
//! Entries are `{payload, fetched_at}` and are always replaced wholesale. The
//! TTL check here is local; it does not consult the invalidation registry (see
//! [`super::loader::CachedLoader`] for the composed policy).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use super::clock::SharedClock;
use super::keys::CacheKey;
use super::lock::{read_guard, write_guard};

const COMPONENT: &str = "cache::store";

/// Cached payload plus the instant it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub payload: V,
    pub fetched_at: u64,
}

impl<V> CacheEntry<V> {
    /// Milliseconds elapsed since the fetch, saturating at zero if the clock went backwards.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.fetched_at)
    }

    pub fn is_expired(&self, now: u64, ttl: Duration) -> bool {
        u128::from(self.age(now)) >= ttl.as_millis()
    }
}

/// Keyed store of listing payloads.
pub struct ResourceCache<V> {
    entries: RwLock<HashMap<CacheKey, CacheEntry<V>>>,
    clock: SharedClock,
}

impl<V: Clone> ResourceCache<V> {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Return the payload for `key` unless it is absent or at least `ttl` old.
    ///
    /// Expired entries are evicted on the way out.
    pub fn get(&self, key: &CacheKey, ttl: Duration) -> Option<V> {
        let now = self.clock.now_millis();
        {
            let entries = read_guard(&self.entries, COMPONENT, "get");
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now, ttl) => return Some(entry.payload.clone()),
                Some(_) => {}
            }
        }

        let mut entries = write_guard(&self.entries, COMPONENT, "get.evict");
        // Another writer may have refreshed the entry between the two locks.
        if entries
            .get(key)
            .is_some_and(|entry| entry.is_expired(now, ttl))
        {
            entries.remove(key);
        }
        None
    }

    /// Raw lookup without TTL eviction, so the caller can inspect `fetched_at`.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        read_guard(&self.entries, COMPONENT, "peek").get(key).cloned()
    }

    /// Store `payload` under `key` stamped with the current instant, replacing any prior entry.
    ///
    /// Returns the `fetched_at` instant written.
    pub fn set(&self, key: CacheKey, payload: V) -> u64 {
        let fetched_at = self.clock.now_millis();
        write_guard(&self.entries, COMPONENT, "set").insert(
            key,
            CacheEntry {
                payload,
                fetched_at,
            },
        );
        fetched_at
    }

    /// Remove `key`; returns whether an entry existed.
    pub fn delete(&self, key: &CacheKey) -> bool {
        write_guard(&self.entries, COMPONENT, "delete")
            .remove(key)
            .is_some()
    }

    pub fn clear(&self) {
        write_guard(&self.entries, COMPONENT, "clear").clear();
    }

    pub fn len(&self) -> usize {
        read_guard(&self.entries, COMPONENT, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;

    use super::*;
    use crate::cache::clock::ManualClock;

    const TTL: Duration = Duration::from_millis(1_000);

    fn store() -> (Arc<ManualClock>, ResourceCache<Vec<&'static str>>) {
        let clock = Arc::new(ManualClock::new(0));
        (clock.clone(), ResourceCache::new(clock))
    }

    #[test]
    fn get_hits_until_ttl_then_evicts() {
        let (clock, store) = store();
        let key = CacheKey::products(None);

        store.set(key.clone(), vec!["ring"]);

        clock.set(500);
        assert_eq!(store.get(&key, TTL), Some(vec!["ring"]));

        clock.set(1_500);
        assert_eq!(store.get(&key, TTL), None);
        assert!(store.peek(&key).is_none(), "expired entry should be evicted");
    }

    #[test]
    fn entry_is_expired_exactly_at_ttl() {
        let (clock, store) = store();
        let key = CacheKey::products(None);
        store.set(key.clone(), vec!["ring"]);

        clock.set(999);
        assert!(store.get(&key, TTL).is_some());
        clock.set(1_000);
        assert!(store.get(&key, TTL).is_none());
    }

    #[test]
    fn set_overwrites_and_restamps() {
        let (clock, store) = store();
        let key = CacheKey::products(Some("aretes"));

        store.set(key.clone(), vec!["old"]);
        clock.set(700);
        let fetched_at = store.set(key.clone(), vec!["new"]);

        let entry = store.peek(&key).expect("entry");
        assert_eq!(fetched_at, 700);
        assert_eq!(entry.fetched_at, 700);
        assert_eq!(entry.payload, vec!["new"]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn peek_does_not_evict_expired_entries() {
        let (clock, store) = store();
        let key = CacheKey::products(None);
        store.set(key.clone(), vec!["ring"]);

        clock.set(10_000);
        let entry = store.peek(&key).expect("peek keeps stale entry");
        assert_eq!(entry.fetched_at, 0);
        assert!(entry.is_expired(10_000, TTL));
    }

    #[test]
    fn delete_and_clear() {
        let (_, store) = store();
        let products = CacheKey::products(None);
        let artists = CacheKey::listing(crate::cache::ResourceType::Artists);

        store.set(products.clone(), vec!["a"]);
        store.set(artists.clone(), vec!["b"]);

        assert!(store.delete(&products));
        assert!(!store.delete(&products));
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn age_saturates_when_clock_moves_backwards() {
        let entry = CacheEntry {
            payload: (),
            fetched_at: 100,
        };
        assert_eq!(entry.age(50), 0);
        assert!(!entry.is_expired(50, TTL));
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let (_, store) = store();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("lock should be acquired");
            panic!("poison store lock");
        }));

        store.set(CacheKey::products(None), vec!["after"]);
        assert_eq!(store.len(), 1);
    }
}
