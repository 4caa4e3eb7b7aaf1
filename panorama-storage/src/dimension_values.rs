//! Distinct values of expansion dimensions.
//!
//! Kept in a store of its own, with its own TTL and locks, because value sets
//! churn at a different rate than row data. The cached form is the
//! organization-agnostic list of per-organization counts; each caller's
//! ranking is computed on read from the organizations its scope permits.

use crate::cache::{CacheRead, CacheStats, CacheStore, Inflight};
use panorama_core::{
    scalar_key, CacheConfig, CacheKey, DataSourceId, DimensionValueCount, PanoramaError,
    PanoramaResult, RawRowFetcher, RbacScope,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ranked distinct values of one column, as seen by one caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionValueSet {
    /// Most frequent first, ties broken lexically.
    pub values: Vec<Value>,
    /// Distinct values visible to the caller before truncation.
    pub total_distinct: usize,
}

impl DimensionValueSet {
    pub fn is_truncated(&self) -> bool {
        self.values.len() < self.total_distinct
    }
}

/// Cache of per-organization value counts, tagged per `(data source, column)`.
pub struct DimensionValueCache {
    store: CacheStore<Vec<DimensionValueCount>>,
    inflight: Inflight,
    ttl: Duration,
    rbac_column: String,
}

impl DimensionValueCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            store: CacheStore::new(config.dimension_max_entries),
            inflight: Inflight::default(),
            ttl: config.dimension_ttl,
            rbac_column: config.rbac_column.clone(),
        }
    }

    /// Up to `limit` values of `column` visible to `rbac`.
    pub async fn values(
        &self,
        data_source_id: DataSourceId,
        column: &str,
        rbac: &RbacScope,
        limit: usize,
        fetcher: &dyn RawRowFetcher,
    ) -> PanoramaResult<CacheRead<DimensionValueSet>> {
        if !rbac.is_resolvable() {
            return Err(PanoramaError::permission_denied(
                "RBAC scope grants no organizations",
            ));
        }
        let counts = self.counts(data_source_id, column, fetcher).await?;
        Ok(counts.map(|counts| rank_values(&counts, rbac, limit)))
    }

    async fn counts(
        &self,
        data_source_id: DataSourceId,
        column: &str,
        fetcher: &dyn RawRowFetcher,
    ) -> PanoramaResult<CacheRead<Arc<Vec<DimensionValueCount>>>> {
        let key = value_key(data_source_id, column);
        if let Some(hit) = self.store.get(&key) {
            debug!(data_source_id = %data_source_id, column, "Dimension value cache hit");
            return Ok(hit);
        }

        let slot = self.inflight.claim(&key);
        let _guard = slot.lock().await;
        if let Some(hit) = self.store.peek(&key) {
            return Ok(hit);
        }

        let tag = value_tag(data_source_id, column);
        let generation = self.store.generation(&tag);
        let counts = Arc::new(
            fetcher
                .fetch_dimension_values(data_source_id, column, &self.rbac_column)
                .await?,
        );
        if let Err(e) =
            self.store
                .set_if_generation(key, Arc::clone(&counts), &tag, self.ttl, generation)
        {
            warn!(
                error = %e,
                data_source_id = %data_source_id,
                column,
                "Failed to cache dimension values"
            );
        }
        Ok(CacheRead::from_fetcher(counts))
    }

    pub(crate) fn invalidate(&self, data_source_id: DataSourceId, column: &str) -> u64 {
        self.store.invalidate_tag(&value_tag(data_source_id, column))
    }

    pub(crate) fn invalidate_data_source(&self, data_source_id: DataSourceId) -> u64 {
        self.store
            .invalidate_tag_prefix(&format!("{}:column:", data_source_id.cache_tag()))
    }

    /// Whether values for `column` are cached.
    pub fn contains(&self, data_source_id: DataSourceId, column: &str) -> bool {
        self.store.peek(&value_key(data_source_id, column)).is_some()
    }

    pub fn sweep(&self) -> u64 {
        self.store.sweep()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

fn value_key(data_source_id: DataSourceId, column: &str) -> CacheKey {
    CacheKey::from_parts(&["dimension", &data_source_id.to_string(), column])
}

fn value_tag(data_source_id: DataSourceId, column: &str) -> String {
    format!("{}:column:{}", data_source_id.cache_tag(), column)
}

/// Sum counts over the organizations `rbac` permits, order by descending
/// frequency then lexically, and keep the first `limit`.
pub fn rank_values(
    counts: &[DimensionValueCount],
    rbac: &RbacScope,
    limit: usize,
) -> DimensionValueSet {
    let mut totals: HashMap<String, (Value, u64)> = HashMap::new();
    for count in counts.iter().filter(|c| rbac.permits_id(&c.organization_id)) {
        let Some(key) = scalar_key(&count.value) else {
            continue;
        };
        totals
            .entry(key)
            .or_insert_with(|| (count.value.clone(), 0))
            .1 += count.rows;
    }

    let mut ranked: Vec<(String, Value, u64)> = totals
        .into_iter()
        .map(|(key, (value, rows))| (key, value, rows))
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let total_distinct = ranked.len();
    ranked.truncate(limit);
    DimensionValueSet {
        values: ranked.into_iter().map(|(_, value, _)| value).collect(),
        total_distinct,
    }
}
