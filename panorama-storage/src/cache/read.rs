//! Read results annotated with where they came from.

use chrono::Utc;
use panorama_core::Timestamp;
use std::time::Duration;

/// Where a read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// A live cache entry.
    Cache,
    /// The external fetcher, on a miss.
    Fetcher,
}

/// A value read through the cache, with the time its underlying data was
/// fetched from the external store.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    fetched_at: Timestamp,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    /// A value served from an entry written at `fetched_at`.
    pub fn from_cache(value: T, fetched_at: Timestamp) -> Self {
        Self {
            value,
            fetched_at,
            source: ReadSource::Cache,
        }
    }

    /// A value just obtained from the external fetcher.
    pub fn from_fetcher(value: T) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
            source: ReadSource::Fetcher,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    /// Age of the underlying data. Zero if the clock moved backwards.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            fetched_at: self.fetched_at,
            source: self.source,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
