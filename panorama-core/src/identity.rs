//! Identity types for panorama data sources and cache entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a configured data source (a table or view charts read from).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSourceId(i64);

impl DataSourceId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Cache tag grouping every entry derived from this data source.
    pub fn cache_tag(&self) -> String {
        format!("data_source:{}", self.0)
    }
}

impl fmt::Display for DataSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DataSourceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Canonical cache key for a raw row set.
///
/// Keys are built from a SHA-256 digest over the canonical form of a query,
/// prefixed with the data source so they stay readable in logs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a namespace, the owning data source and the bytes to digest.
    pub fn digest(namespace: &str, data_source_id: DataSourceId, material: &[u8]) -> Self {
        Self(format!(
            "{}:{}:{}",
            namespace,
            data_source_id,
            hex::encode(compute_digest(material))
        ))
    }

    /// Build a key verbatim. Used for keys whose components are already canonical.
    pub fn from_parts(parts: &[&str]) -> Self {
        Self(parts.join(":"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute SHA-256 digest of content.
pub fn compute_digest(content: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_source_tag() {
        assert_eq!(DataSourceId::new(7).cache_tag(), "data_source:7");
    }

    #[test]
    fn test_cache_key_digest_is_stable() {
        let a = CacheKey::digest("rows", DataSourceId::new(7), b"charges");
        let b = CacheKey::digest("rows", DataSourceId::new(7), b"charges");
        let c = CacheKey::digest("rows", DataSourceId::new(8), b"charges");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("rows:7:"));
        assert_eq!(a.as_str().len(), "rows:7:".len() + 64);
    }

    #[test]
    fn test_cache_key_from_parts() {
        let key = CacheKey::from_parts(&["dimension", "7", "location"]);
        assert_eq!(key.to_string(), "dimension:7:location");
    }
}
