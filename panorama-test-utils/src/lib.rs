//! Panorama Test Utilities
//!
//! Mock collaborators, fixtures and proptest generators shared by the
//! panorama crates' tests.
//!
//! # Contents
//!
//! - [`RecordingFetcher`]: in-memory `RawRowFetcher` that records every call
//! - [`StaticColumnProvider`]: fixed column metadata per data source
//! - [`fixtures`]: the dashboard data set and specs used across tests
//! - [`generators`]: proptest strategies for rows, scopes, filters and specs

use async_trait::async_trait;
use panorama_core::{
    apply_filters, scalar_key, CanonicalQuerySpec, ColumnMetadataProvider, DataSourceColumns,
    DataSourceId, DimensionValueCount, FetchError, PanoramaResult, RawRow, RawRowFetcher,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// MOCK ROW FETCHER
// ============================================================================

/// In-memory row fetcher that counts and records every call.
///
/// Pushes advanced filters down the way a real store would; never applies
/// access control.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    rows: HashMap<DataSourceId, Vec<RawRow>>,
    failing_measures: HashSet<String>,
    delay: Option<Duration>,
    row_calls: AtomicU64,
    completed_row_calls: AtomicU64,
    dimension_calls: AtomicU64,
    recorded: Mutex<Vec<CanonicalQuerySpec>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher serving [`fixtures::dashboard_rows`] for the dashboard data source.
    pub fn with_dashboard_rows() -> Self {
        Self::new().with_rows(fixtures::DASHBOARD_DS, fixtures::dashboard_rows())
    }

    pub fn with_rows(mut self, data_source_id: DataSourceId, rows: Vec<RawRow>) -> Self {
        self.rows.insert(data_source_id, rows);
        self
    }

    /// Make every fetch of `measure` fail.
    pub fn failing_measure(mut self, measure: impl Into<String>) -> Self {
        self.failing_measures.insert(measure.into());
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn row_calls(&self) -> u64 {
        self.row_calls.load(Ordering::SeqCst)
    }

    /// Row fetches that ran past their delay. A cancelled fetch never counts.
    pub fn completed_row_calls(&self) -> u64 {
        self.completed_row_calls.load(Ordering::SeqCst)
    }

    pub fn dimension_calls(&self) -> u64 {
        self.dimension_calls.load(Ordering::SeqCst)
    }

    /// Specs passed to `fetch_rows`, in call order.
    pub fn recorded_specs(&self) -> Vec<CanonicalQuerySpec> {
        self.recorded.lock().expect("recorded specs lock").clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RawRowFetcher for RecordingFetcher {
    async fn fetch_rows(&self, spec: &CanonicalQuerySpec) -> PanoramaResult<Vec<RawRow>> {
        self.row_calls.fetch_add(1, Ordering::SeqCst);
        self.recorded
            .lock()
            .expect("recorded specs lock")
            .push(spec.clone());
        self.pause().await;
        self.completed_row_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_measures.contains(spec.measure()) {
            return Err(FetchError::Failed {
                data_source_id: spec.data_source_id(),
                reason: format!("unknown measure {}", spec.measure()),
            }
            .into());
        }
        let rows = self
            .rows
            .get(&spec.data_source_id())
            .cloned()
            .unwrap_or_default();
        Ok(apply_filters(rows, spec.advanced_filters()))
    }

    async fn fetch_dimension_values(
        &self,
        data_source_id: DataSourceId,
        column: &str,
        organization_column: &str,
    ) -> PanoramaResult<Vec<DimensionValueCount>> {
        self.dimension_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let mut counts: BTreeMap<(String, String), DimensionValueCount> = BTreeMap::new();
        for row in self.rows.get(&data_source_id).into_iter().flatten() {
            let (Some(value), Some(org)) = (row.get(column), row.get(organization_column)) else {
                continue;
            };
            let (Some(value_key), Some(org_key)) = (scalar_key(value), scalar_key(org)) else {
                continue;
            };
            counts
                .entry((value_key, org_key.clone()))
                .or_insert_with(|| DimensionValueCount {
                    value: value.clone(),
                    organization_id: org_key,
                    rows: 0,
                })
                .rows += 1;
        }
        Ok(counts.into_values().collect())
    }
}

// ============================================================================
// MOCK COLUMN METADATA
// ============================================================================

/// Column metadata provider backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticColumnProvider {
    sources: HashMap<DataSourceId, DataSourceColumns>,
}

impl StaticColumnProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider knowing the dashboard and the secondary data source.
    pub fn dashboard() -> Self {
        Self::new()
            .with_data_source(fixtures::DASHBOARD_DS, fixtures::dashboard_columns())
            .with_data_source(fixtures::OTHER_DS, fixtures::other_columns())
    }

    pub fn with_data_source(mut self, id: DataSourceId, columns: DataSourceColumns) -> Self {
        self.sources.insert(id, columns);
        self
    }
}

#[async_trait]
impl ColumnMetadataProvider for StaticColumnProvider {
    async fn columns(&self, data_source_id: DataSourceId) -> PanoramaResult<Option<DataSourceColumns>> {
        Ok(self.sources.get(&data_source_id).cloned())
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! The billing dashboard data set.
    //!
    //! Data source 7 holds six months of rows for three organizations:
    //! `101` has Downtown and Uptown, `102` Downtown, `103` Airport.

    use chrono::NaiveDate;
    use panorama_core::{
        ColumnMetadata, CanonicalQuerySpec, DataSourceColumns, DataSourceId, DateRange, Frequency,
        RawRow, SeriesSpec,
    };

    pub const DASHBOARD_DS: DataSourceId = DataSourceId::new(7);
    pub const OTHER_DS: DataSourceId = DataSourceId::new(8);
    pub const MONTHS: [&str; 6] = [
        "2024-01", "2024-02", "2024-03", "2024-04", "2024-05", "2024-06",
    ];

    const SITES: [(&str, &str, &str); 4] = [
        ("101", "Downtown", "Dr. Ames"),
        ("101", "Uptown", "Dr. Baker"),
        ("102", "Downtown", "Dr. Chen"),
        ("103", "Airport", "Dr. Diaz"),
    ];

    pub fn dashboard_rows() -> Vec<RawRow> {
        let mut rows = Vec::new();
        for (m, month) in MONTHS.iter().enumerate() {
            for (s, (org, location, provider)) in SITES.iter().enumerate() {
                let base = (m as i64 + 1) * 1000 + s as i64 * 10;
                rows.push(
                    RawRow::new()
                        .with("organization_id", *org)
                        .with("location", *location)
                        .with("provider_name", *provider)
                        .with("month", *month)
                        .with("Charges", base)
                        .with("Payments", base / 2),
                );
            }
        }
        rows
    }

    pub fn dashboard_columns() -> DataSourceColumns {
        DataSourceColumns::new(vec![
            ColumnMetadata::new("organization_id").filterable(),
            ColumnMetadata::new("location").filterable().expansion_dimension(),
            ColumnMetadata::new("month").filterable().expansion_dimension(),
            // Misconfigured: expandable but not filterable.
            ColumnMetadata::new("provider_name").expansion_dimension(),
            ColumnMetadata::new("notes"),
            ColumnMetadata::new("Charges"),
            ColumnMetadata::new("Payments"),
        ])
    }

    pub fn other_columns() -> DataSourceColumns {
        DataSourceColumns::new(vec![
            ColumnMetadata::new("organization_id").filterable(),
            ColumnMetadata::new("Charges"),
        ])
    }

    pub fn first_half_2024() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            NaiveDate::from_ymd_opt(2024, 6, 30).expect("valid date"),
        )
        .expect("valid range")
    }

    /// Monthly Charges for the first half of 2024.
    pub fn charges_spec() -> CanonicalQuerySpec {
        CanonicalQuerySpec::builder(DASHBOARD_DS, "Charges")
            .frequency(Frequency::Monthly)
            .date_range(first_half_2024())
            .build()
            .expect("valid spec")
    }

    /// Charges and Payments as two series.
    pub fn two_series_spec() -> CanonicalQuerySpec {
        CanonicalQuerySpec::builder(DASHBOARD_DS, "Charges")
            .frequency(Frequency::Monthly)
            .date_range(first_half_2024())
            .series(SeriesSpec::new("charges", "Charges", "Charges"))
            .series(SeriesSpec::new("payments", "Payments", "Payments"))
            .build()
            .expect("valid spec")
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies over the dashboard schema.

    use super::fixtures::{DASHBOARD_DS, MONTHS};
    use panorama_core::{CanonicalQuerySpec, FilterExpr, FilterOperator, RawRow, RbacScope};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    pub const ORGS: [&str; 4] = ["101", "102", "103", "104"];
    pub const LOCATIONS: [&str; 4] = ["Downtown", "Uptown", "Airport", "Harbor"];

    pub fn arb_org_id() -> impl Strategy<Value = String> {
        prop::sample::select(ORGS.to_vec()).prop_map(str::to_string)
    }

    pub fn arb_location() -> impl Strategy<Value = String> {
        prop::sample::select(LOCATIONS.to_vec()).prop_map(str::to_string)
    }

    pub fn arb_month() -> impl Strategy<Value = String> {
        prop::sample::select(MONTHS.to_vec()).prop_map(str::to_string)
    }

    /// A dashboard row. Occasionally lacks its organization identifier.
    pub fn arb_row() -> impl Strategy<Value = RawRow> {
        (
            prop::option::weighted(0.9, arb_org_id()),
            arb_location(),
            arb_month(),
            0i64..10_000,
        )
            .prop_map(|(org, location, month, charges)| {
                let row = RawRow::new()
                    .with("location", location)
                    .with("month", month)
                    .with("Charges", charges);
                match org {
                    Some(org) => row.with("organization_id", org),
                    None => row,
                }
            })
    }

    pub fn arb_rows() -> impl Strategy<Value = Vec<RawRow>> {
        prop::collection::vec(arb_row(), 0..40)
    }

    /// Explicit scopes only, including the empty one.
    pub fn arb_scope() -> impl Strategy<Value = RbacScope> {
        prop::collection::btree_set(arb_org_id(), 0..4).prop_map(RbacScope::Organizations)
    }

    /// A filter over a filterable dashboard column.
    pub fn arb_filter() -> impl Strategy<Value = FilterExpr> {
        prop_oneof![
            arb_location().prop_map(|l| FilterExpr::eq("location", json!(l))),
            arb_location().prop_map(|l| FilterExpr::new("location", FilterOperator::Ne, json!(l))),
            prop::collection::vec(arb_month(), 1..3).prop_map(|ms| {
                FilterExpr::is_in("month", ms.into_iter().map(Value::from).collect())
            }),
            arb_month().prop_map(|m| FilterExpr::new("month", FilterOperator::Gte, json!(m))),
        ]
    }

    /// A single-measure spec on the dashboard data source.
    pub fn arb_spec() -> impl Strategy<Value = CanonicalQuerySpec> {
        prop::collection::vec(arb_filter(), 0..3).prop_map(|filters| {
            CanonicalQuerySpec::builder(DASHBOARD_DS, "Charges")
                .filters(filters)
                .build()
                .expect("generated filters are valid")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetcher_counts_and_fails_measures() {
        let fetcher = RecordingFetcher::with_dashboard_rows().failing_measure("Bogus");
        let rows = fetcher.fetch_rows(&fixtures::charges_spec()).await.unwrap();
        assert_eq!(rows.len(), 24);

        let bogus = CanonicalQuerySpec::builder(fixtures::DASHBOARD_DS, "Bogus")
            .build()
            .unwrap();
        assert!(fetcher.fetch_rows(&bogus).await.is_err());
        assert_eq!(fetcher.row_calls(), 2);
        assert_eq!(fetcher.completed_row_calls(), 2);
        assert_eq!(fetcher.recorded_specs().len(), 2);
    }

    #[tokio::test]
    async fn test_dimension_counts_per_org() {
        let fetcher = RecordingFetcher::with_dashboard_rows();
        let counts = fetcher
            .fetch_dimension_values(fixtures::DASHBOARD_DS, "location", "organization_id")
            .await
            .unwrap();
        // (Airport,103) (Downtown,101) (Downtown,102) (Uptown,101)
        assert_eq!(counts.len(), 4);
        assert!(counts.iter().all(|c| c.rows == 6));
        assert_eq!(fetcher.dimension_calls(), 1);
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticColumnProvider::dashboard();
        let columns = provider.columns(fixtures::DASHBOARD_DS).await.unwrap().unwrap();
        assert!(columns.is_filterable("location"));
        assert!(provider
            .columns(DataSourceId::new(999))
            .await
            .unwrap()
            .is_none());
    }
}
