//! Concurrent map whose entries expire a fixed time after they were written
//!
//! Expiry policy: each entry carries the instant it was last inserted.
//! Reads never extend its life. Expired entries are invisible to readers and
//! are removed lazily on access or eagerly by [`ExpiringMap::purge_expired`].

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Slot<V> {
    value: V,
    written_at: Instant,
}

impl<V> Slot<V> {
    fn new(value: V) -> Self {
        Self { value, written_at: Instant::now() }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.written_at.elapsed() >= ttl
    }
}

pub struct ExpiringMap<K, V> {
    entries: DashMap<K, Slot<V>>,
    ttl: Duration,
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    /// Insert or replace, restarting the entry's lifetime.
    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, Slot::new(value));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(slot) if !slot.is_expired(self.ttl) => return Some(slot.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, slot| slot.is_expired(self.ttl));
        }
        None
    }

    /// Return the live value for `key`, inserting `make()` if it is absent or expired.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        match self.entries.entry(key) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(self.ttl) {
                    occupied.insert(Slot::new(make()));
                }
                occupied.get().value.clone()
            }
            MapEntry::Vacant(vacant) => vacant.insert(Slot::new(make())).value.clone(),
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, slot)| slot.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(self.ttl));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_entries_are_returned() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        map.insert("a", 1);
        assert_eq!(map.get(&"a"), Some(1));
        assert_eq!(map.get(&"b"), None);
    }

    #[test]
    fn expired_entries_are_invisible_and_removed() {
        let map = ExpiringMap::new(Duration::ZERO);
        map.insert("a", 1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&"a"), None);
        assert!(map.is_empty());
    }

    #[test]
    fn get_or_insert_replaces_expired_value() {
        let map = ExpiringMap::new(Duration::ZERO);
        map.insert("a", 1);
        assert_eq!(map.get_or_insert_with("a", || 2), 2);

        let map = ExpiringMap::new(Duration::from_secs(60));
        map.insert("a", 1);
        assert_eq!(map.get_or_insert_with("a", || 2), 1);
    }

    #[test]
    fn purge_counts_removed_entries() {
        let map = ExpiringMap::new(Duration::ZERO);
        map.insert(1, "x");
        map.insert(2, "y");
        assert_eq!(map.purge_expired(), 2);
        assert_eq!(map.purge_expired(), 0);
    }

    #[test]
    fn remove_returns_value() {
        let map = ExpiringMap::new(Duration::from_secs(60));
        map.insert("k", 5);
        assert_eq!(map.remove(&"k"), Some(5));
        assert_eq!(map.remove(&"k"), None);
    }
}
