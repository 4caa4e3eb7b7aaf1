//! Raw row cache with per-read access control.
//!
//! Row sets are cached organization-agnostic, keyed by the spec's canonical
//! key. Every read, hit or miss, goes through [`apply_read_filters`], which
//! applies the caller's RBAC scope and then every effective filter.

use crate::cache::{CacheRead, CacheStats, CacheStore, Inflight};
use panorama_core::{
    CacheConfig, CacheKey, CanonicalQuerySpec, ColumnMetadataProvider, DataSourceId, FilterExpr,
    PanoramaError, PanoramaResult, RawRow, RawRowFetcher, RbacScope, ValidationError,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Rows visible to one caller, annotated with cache provenance.
pub type FilteredRows = CacheRead<Vec<RawRow>>;

/// Cache of raw row sets, tagged by data source.
pub struct DataSourceCache {
    store: CacheStore<Vec<RawRow>>,
    columns: Arc<dyn ColumnMetadataProvider>,
    inflight: Inflight,
    ttl: Duration,
    rbac_column: String,
}

impl DataSourceCache {
    pub fn new(config: &CacheConfig, columns: Arc<dyn ColumnMetadataProvider>) -> Self {
        Self {
            store: CacheStore::new(config.max_entries),
            columns,
            inflight: Inflight::default(),
            ttl: config.row_ttl,
            rbac_column: config.rbac_column.clone(),
        }
    }

    /// Rows for `spec` visible to `rbac`.
    ///
    /// # Errors
    /// - `PermissionDenied` if `rbac` grants no organization. Checked before
    ///   anything is fetched.
    /// - `UnknownDataSource` if the data source has no column metadata. Checked
    ///   before the cache or the fetcher is touched.
    /// - `InvalidFilterField` if an effective filter names a column that is not
    ///   filterable.
    /// - Whatever the fetcher returns on a miss.
    pub async fn fetch(
        &self,
        spec: &CanonicalQuerySpec,
        rbac: &RbacScope,
        fetcher: &dyn RawRowFetcher,
    ) -> PanoramaResult<FilteredRows> {
        if !rbac.is_resolvable() {
            return Err(PanoramaError::permission_denied(
                "RBAC scope grants no organizations",
            ));
        }

        let filters = spec.effective_filters();
        self.validate(spec.data_source_id(), &filters).await?;

        let raw = self.raw_rows(spec, fetcher).await?;
        Ok(raw.map(|rows| apply_read_filters(&rows, rbac, &self.rbac_column, &filters)))
    }

    async fn raw_rows(
        &self,
        spec: &CanonicalQuerySpec,
        fetcher: &dyn RawRowFetcher,
    ) -> PanoramaResult<CacheRead<Arc<Vec<RawRow>>>> {
        let key = spec.cache_key();
        let data_source_id = spec.data_source_id();

        if let Some(hit) = self.store.get(&key) {
            debug!(cache_key = %key, data_source_id = %data_source_id, "Row cache hit");
            return Ok(hit);
        }

        let slot = self.inflight.claim(&key);
        let _guard = slot.lock().await;
        if let Some(hit) = self.store.peek(&key) {
            debug!(cache_key = %key, data_source_id = %data_source_id, "Row cache filled by concurrent fetch");
            return Ok(hit);
        }

        debug!(cache_key = %key, data_source_id = %data_source_id, "Row cache miss");
        let tag = data_source_id.cache_tag();
        let generation = self.store.generation(&tag);
        let rows = Arc::new(fetcher.fetch_rows(&spec.without_dimension_filter()).await?);

        if let Err(e) =
            self.store
                .set_if_generation(key.clone(), Arc::clone(&rows), &tag, self.ttl, generation)
        {
            warn!(
                error = %e,
                cache_key = %key,
                data_source_id = %data_source_id,
                "Failed to cache raw rows, serving fetched rows directly"
            );
        }

        Ok(CacheRead::from_fetcher(rows))
    }

    /// The data source must exist and every filter must name a filterable
    /// column. Runs on hits too, so a deleted data source never serves rows.
    async fn validate(
        &self,
        data_source_id: DataSourceId,
        filters: &[FilterExpr],
    ) -> PanoramaResult<()> {
        let columns = self
            .columns
            .columns(data_source_id)
            .await?
            .ok_or(ValidationError::UnknownDataSource { data_source_id })?;

        if let Some(filter) = filters.iter().find(|f| !columns.is_filterable(&f.field)) {
            return Err(ValidationError::InvalidFilterField {
                data_source_id,
                field: filter.field.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Store raw rows for `spec` ahead of any request.
    pub fn prime(&self, spec: &CanonicalQuerySpec, rows: Vec<RawRow>) -> PanoramaResult<()> {
        self.store
            .set(
                spec.cache_key(),
                rows,
                &spec.data_source_id().cache_tag(),
                self.ttl,
            )
            .map_err(Into::into)
    }

    /// Whether a live raw row set is cached for `spec`.
    pub fn contains(&self, spec: &CanonicalQuerySpec) -> bool {
        self.store.peek(&spec.cache_key()).is_some()
    }

    pub(crate) fn invalidate(&self, data_source_id: DataSourceId) -> u64 {
        self.store.invalidate_tag(&data_source_id.cache_tag())
    }

    /// Keys cached for a data source.
    pub fn keys_for(&self, data_source_id: DataSourceId) -> Vec<CacheKey> {
        self.store.keys_for_tag(&data_source_id.cache_tag())
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

    pub fn rbac_column(&self) -> &str {
        &self.rbac_column
    }
}

/// The one place rows are filtered for a caller: RBAC first, then every
/// filter. Fails closed on an unresolvable scope.
pub fn apply_read_filters(
    rows: &[RawRow],
    rbac: &RbacScope,
    rbac_column: &str,
    filters: &[FilterExpr],
) -> Vec<RawRow> {
    if !rbac.is_resolvable() {
        return Vec::new();
    }
    rows.iter()
        .filter(|row| rbac.permits_row(row, rbac_column))
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use panorama_core::{AccessError, DimensionFilter};
    use panorama_test_utils::{fixtures, RecordingFetcher, StaticColumnProvider};
    use serde_json::json;

    fn cache() -> DataSourceCache {
        DataSourceCache::new(
            &CacheConfig::default(),
            Arc::new(StaticColumnProvider::dashboard()),
        )
    }

    fn scope() -> RbacScope {
        RbacScope::organizations(["101", "102"])
    }

    #[tokio::test]
    async fn test_miss_then_hit_fetches_once() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let spec = fixtures::charges_spec();

        let cold = cache.fetch(&spec, &scope(), &fetcher).await.unwrap();
        let warm = cache.fetch(&spec, &scope(), &fetcher).await.unwrap();

        assert!(!cold.was_cache_hit());
        assert!(warm.was_cache_hit());
        assert_eq!(cold.value(), warm.value());
        assert_eq!(fetcher.row_calls(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_rbac_applied_on_hit_per_caller() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let spec = fixtures::charges_spec();

        let wide = cache.fetch(&spec, &scope(), &fetcher).await.unwrap();
        let narrow = cache
            .fetch(&spec, &RbacScope::organizations(["102"]), &fetcher)
            .await
            .unwrap();

        assert_eq!(fetcher.row_calls(), 1);
        assert!(narrow.value().len() < wide.value().len());
        assert!(narrow
            .value()
            .iter()
            .all(|r| r.get("organization_id") == Some(&json!("102"))));
    }

    #[tokio::test]
    async fn test_empty_scope_denied_before_fetch() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();

        let err = cache
            .fetch(&fixtures::charges_spec(), &RbacScope::empty(), &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PanoramaError::Access(AccessError::PermissionDenied { .. })
        ));
        assert_eq!(fetcher.row_calls(), 0);
    }

    #[tokio::test]
    async fn test_unfilterable_field_rejected() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let spec = CanonicalQuerySpec::builder(fixtures::DASHBOARD_DS, "Charges")
            .filter(FilterExpr::eq("notes", json!("x")))
            .build()
            .unwrap();

        let err = cache.fetch(&spec, &scope(), &fetcher).await.unwrap_err();
        assert!(matches!(
            err,
            PanoramaError::Validation(ValidationError::InvalidFilterField { ref field, .. })
                if field == "notes"
        ));
        assert_eq!(fetcher.row_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_data_source_rejected_before_fetch() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let spec = CanonicalQuerySpec::builder(DataSourceId::new(404), "Charges")
            .build()
            .unwrap();

        let err = cache.fetch(&spec, &scope(), &fetcher).await.unwrap_err();
        assert!(matches!(
            err,
            PanoramaError::Validation(ValidationError::UnknownDataSource { data_source_id })
                if data_source_id == DataSourceId::new(404)
        ));
        assert_eq!(fetcher.row_calls(), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_filter_reuses_raw_rows() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let base = fixtures::charges_spec();
        let downtown =
            base.with_dimension_filter(DimensionFilter::new("location", json!("Downtown")));

        let all = cache.fetch(&base, &scope(), &fetcher).await.unwrap();
        let filtered = cache.fetch(&downtown, &scope(), &fetcher).await.unwrap();

        assert_eq!(fetcher.row_calls(), 1);
        assert!(filtered.was_cache_hit());
        assert!(!filtered.value().is_empty());
        assert!(filtered.value().len() < all.value().len());
        assert!(filtered
            .value()
            .iter()
            .all(|r| r.get("location") == Some(&json!("Downtown"))));
    }

    #[tokio::test]
    async fn test_fetcher_never_sees_dimension_filter() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let spec = fixtures::charges_spec()
            .with_dimension_filter(DimensionFilter::new("location", json!("Uptown")));

        cache.fetch(&spec, &scope(), &fetcher).await.unwrap();
        let seen = fetcher.recorded_specs();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].dimension_filter().is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_is_not_cached() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows().failing_measure("Charges");
        let spec = fixtures::charges_spec();

        assert!(cache.fetch(&spec, &scope(), &fetcher).await.is_err());
        assert!(!cache.contains(&spec));
    }

    #[tokio::test]
    async fn test_set_failure_still_returns_rows() {
        let cache = DataSourceCache::new(
            &CacheConfig::default().with_max_entries(0),
            Arc::new(StaticColumnProvider::dashboard()),
        );
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let spec = fixtures::charges_spec();

        let first = cache.fetch(&spec, &scope(), &fetcher).await.unwrap();
        let second = cache.fetch(&spec, &scope(), &fetcher).await.unwrap();

        assert!(!first.value().is_empty());
        assert_eq!(first.value(), second.value());
        assert_eq!(fetcher.row_calls(), 2);
        assert_eq!(cache.stats().set_failures, 2);
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_discards_write() {
        let cache = Arc::new(cache());
        let fetcher = Arc::new(
            RecordingFetcher::with_dashboard_rows().with_delay(Duration::from_millis(50)),
        );
        let spec = fixtures::charges_spec();

        let task = {
            let (cache, fetcher, spec) = (Arc::clone(&cache), Arc::clone(&fetcher), spec.clone());
            tokio::spawn(async move { cache.fetch(&spec, &scope(), fetcher.as_ref()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate(spec.data_source_id());

        assert!(task.await.unwrap().is_ok());
        assert!(!cache.contains(&spec));
    }

    #[tokio::test]
    async fn test_prime_serves_without_fetch() {
        let cache = cache();
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let spec = fixtures::charges_spec();

        cache.prime(&spec, fixtures::dashboard_rows()).unwrap();
        let read = cache.fetch(&spec, &scope(), &fetcher).await.unwrap();
        assert!(read.was_cache_hit());
        assert_eq!(fetcher.row_calls(), 0);
        assert_eq!(cache.keys_for(spec.data_source_id()), vec![spec.cache_key()]);
    }

    #[test]
    fn test_apply_read_filters_fails_closed() {
        let rows = fixtures::dashboard_rows();
        assert!(apply_read_filters(&rows, &RbacScope::empty(), "organization_id", &[]).is_empty());
        assert_eq!(
            apply_read_filters(&rows, &RbacScope::AllOrganizations, "organization_id", &[]).len(),
            rows.len()
        );
    }
}
