//! Per-key coalescing of concurrent misses.
//!
//! The first task to miss on a key holds the key's lock while it fetches;
//! later tasks wait on the same lock and re-check the store once they get it.

use dashmap::DashMap;
use panorama_core::CacheKey;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub(crate) struct Inflight {
    slots: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl Inflight {
    pub(crate) fn claim(&self, key: &CacheKey) -> InflightSlot<'_> {
        let lock = Arc::clone(&*self.slots.entry(key.clone()).or_default());
        InflightSlot {
            slots: &self.slots,
            key: key.clone(),
            lock,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// A claim on one key's slot. Dropping the last claim frees the slot.
pub(crate) struct InflightSlot<'a> {
    slots: &'a DashMap<CacheKey, Arc<Mutex<()>>>,
    key: CacheKey,
    lock: Arc<Mutex<()>>,
}

impl InflightSlot<'_> {
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // One reference in the map plus ours means nobody else is waiting.
        self.slots.remove_if(&self.key, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) <= 2
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_released_after_last_claim() {
        let inflight = Inflight::default();
        let key = CacheKey::from_parts(&["rows", "7", "abc"]);

        let first = inflight.claim(&key);
        let second = inflight.claim(&key);
        assert_eq!(inflight.len(), 1);

        drop(first);
        assert_eq!(inflight.len(), 1);
        drop(second);
        assert_eq!(inflight.len(), 0);
    }

    #[tokio::test]
    async fn test_claims_share_one_lock() {
        let inflight = Inflight::default();
        let key = CacheKey::from_parts(&["rows", "7", "abc"]);

        let first = inflight.claim(&key);
        let second = inflight.claim(&key);
        let guard = first.lock().await;
        assert!(second.lock.try_lock().is_err());
        drop(guard);
        assert!(second.lock.try_lock().is_ok());
    }
}
