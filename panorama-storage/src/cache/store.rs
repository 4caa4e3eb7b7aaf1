//! TTL key/value store with a tag index for bulk invalidation.
//!
//! Two concurrent maps hold the state: the primary `key -> entry` map and the
//! secondary `tag -> {generation, keys}` index. Both are sharded, so unrelated
//! data sources never contend on one lock.
//!
//! Lock order is always index shard first, then primary shard. Reads touch
//! only the primary map, which is authoritative: a key that is gone from the
//! primary map is a miss even if an index set still lists it for a moment.
//!
//! Re-tagging a key is two steps: the key joins the new tag's set, then leaves
//! the old one. In between it is listed under both tags. That window is
//! harmless because invalidation only removes entries whose own tag matches,
//! so invalidating the old tag cannot touch the re-tagged entry. Closing the
//! window would mean holding two index shards at once, which can deadlock when
//! both tags hash to the same shard.
//!
//! Each tag carries a generation that only [`CacheStore::invalidate_tag`]
//! bumps. Writers that fetched data before an invalidation pass the generation
//! they observed to [`CacheStore::set_if_generation`] and are rejected, so a
//! slow fetch can never resurrect pre-invalidation data.

use super::read::CacheRead;
use super::stats::{CacheStats, StatsCounters};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use panorama_core::{CacheBackendError, CacheKey, Timestamp};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct CacheEntry<V> {
    tag: String,
    value: Arc<V>,
    created_at: Timestamp,
    expires_at: Timestamp,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct TagIndex {
    generation: u64,
    keys: HashSet<CacheKey>,
}

/// In-memory TTL cache with tag-based invalidation.
#[derive(Debug)]
pub struct CacheStore<V> {
    entries: DashMap<CacheKey, CacheEntry<V>>,
    index: DashMap<String, TagIndex>,
    max_entries: usize,
    counters: StatsCounters,
}

impl<V> CacheStore<V> {
    /// Create a store holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            index: DashMap::new(),
            max_entries,
            counters: StatsCounters::default(),
        }
    }

    /// Look up a live entry. Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheRead<Arc<V>>> {
        let found = self.peek(key);
        if found.is_some() {
            self.counters.hit();
        } else {
            self.counters.miss();
        }
        found
    }

    /// Like [`get`](Self::get) but without touching the hit/miss counters.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheRead<Arc<V>>> {
        let now = Utc::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                return Some(CacheRead::from_cache(
                    Arc::clone(&entry.value),
                    entry.created_at,
                ));
            }
            Some(_) => true,
            None => false,
        };
        if expired && self.remove_where(key, |entry| entry.is_expired(now)) {
            self.counters.expired(1);
        }
        None
    }

    /// Insert or overwrite `key` under `tag`.
    pub fn set(
        &self,
        key: CacheKey,
        value: V,
        tag: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        self.insert(key, Arc::new(value), tag, ttl, None)
    }

    /// Insert or overwrite `key` only if `tag` has not been invalidated since
    /// `generation` was read from [`generation`](Self::generation).
    pub fn set_if_generation(
        &self,
        key: CacheKey,
        value: Arc<V>,
        tag: &str,
        ttl: Duration,
        generation: u64,
    ) -> Result<(), CacheBackendError> {
        self.insert(key, value, tag, ttl, Some(generation))
    }

    fn insert(
        &self,
        key: CacheKey,
        value: Arc<V>,
        tag: &str,
        ttl: Duration,
        expected_generation: Option<u64>,
    ) -> Result<(), CacheBackendError> {
        let result = self
            .ensure_capacity(&key)
            .and_then(|()| self.insert_indexed(key, value, tag, ttl, expected_generation));
        match &result {
            Ok(()) => self.counters.set(),
            Err(_) => self.counters.set_failure(),
        }
        result
    }

    fn insert_indexed(
        &self,
        key: CacheKey,
        value: Arc<V>,
        tag: &str,
        ttl: Duration,
        expected_generation: Option<u64>,
    ) -> Result<(), CacheBackendError> {
        let now = Utc::now();
        let previous_tag = {
            let mut index = self.index.entry(tag.to_string()).or_default();
            if let Some(expected) = expected_generation {
                if index.generation != expected {
                    return Err(CacheBackendError::StaleGeneration {
                        tag: tag.to_string(),
                        expected,
                        current: index.generation,
                    });
                }
            }

            let entry = CacheEntry {
                tag: tag.to_string(),
                value,
                created_at: now,
                expires_at: expiry(now, ttl),
            };
            let previous = self.entries.insert(key.clone(), entry);
            index.keys.insert(key.clone());
            previous.map(|p| p.tag).filter(|old| old != tag)
        };

        if let Some(old_tag) = previous_tag {
            self.unindex(&old_tag, &key);
        }
        Ok(())
    }

    /// Drop `key` from `tag`'s set unless the key has been re-added under it.
    fn unindex(&self, tag: &str, key: &CacheKey) {
        if let Some(mut index) = self.index.get_mut(tag) {
            let still_tagged = self.entries.get(key).is_some_and(|e| e.tag == tag);
            if !still_tagged {
                index.keys.remove(key);
            }
        }
    }

    fn ensure_capacity(&self, key: &CacheKey) -> Result<(), CacheBackendError> {
        let full = || self.entries.len() >= self.max_entries && !self.entries.contains_key(key);
        if full() {
            self.sweep();
            if full() {
                return Err(CacheBackendError::CapacityExceeded {
                    capacity: self.max_entries,
                });
            }
        }
        Ok(())
    }

    /// Current generation of `tag`. Unknown tags are at generation zero.
    pub fn generation(&self, tag: &str) -> u64 {
        self.index.get(tag).map(|i| i.generation).unwrap_or(0)
    }

    /// Remove every entry tagged `tag` and bump its generation.
    ///
    /// Primary entries are deleted before the tag set is cleared, all while
    /// holding the tag's index lock, so a concurrent write under the same tag
    /// waits until the invalidation is complete.
    pub(crate) fn invalidate_tag(&self, tag: &str) -> u64 {
        let mut index = self.index.entry(tag.to_string()).or_default();
        let keys: Vec<CacheKey> = index.keys.iter().cloned().collect();
        let mut removed = 0u64;
        for key in &keys {
            if self.entries.remove_if(key, |_, e| e.tag == tag).is_some() {
                removed += 1;
            }
        }
        index.keys.clear();
        index.generation += 1;
        drop(index);

        self.counters.invalidated(removed);
        removed
    }

    /// Invalidate every tag starting with `prefix`.
    pub(crate) fn invalidate_tag_prefix(&self, prefix: &str) -> u64 {
        let tags: Vec<String> = self
            .index
            .iter()
            .filter(|t| t.key().starts_with(prefix))
            .map(|t| t.key().clone())
            .collect();
        tags.iter().map(|tag| self.invalidate_tag(tag)).sum()
    }

    fn remove_where(&self, key: &CacheKey, predicate: impl Fn(&CacheEntry<V>) -> bool) -> bool {
        loop {
            let Some(tag) = self.entries.get(key).map(|e| e.tag.clone()) else {
                return false;
            };
            let Some(mut index) = self.index.get_mut(&tag) else {
                return false;
            };
            match self.entries.remove_if(key, |_, e| e.tag == tag && predicate(e)) {
                Some(_) => {
                    index.keys.remove(key);
                    return true;
                }
                // Re-tagged between the lookup and the lock; try the new tag.
                None if self.entries.get(key).is_some_and(|e| e.tag != tag) => continue,
                None => return false,
            }
        }
    }

    /// Remove every expired entry.
    pub fn sweep(&self) -> u64 {
        let now = Utc::now();
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        let removed = expired
            .iter()
            .filter(|key| self.remove_where(key, |e| e.is_expired(now)))
            .count() as u64;
        self.counters.expired(removed);
        removed
    }

    /// Keys currently indexed under `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> Vec<CacheKey> {
        self.index
            .get(tag)
            .map(|i| i.keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }
}

fn expiry(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
