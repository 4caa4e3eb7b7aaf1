//! Property-Based Tests for Cached Chart Reads
//!
//! **Property 1: Cold and warm reads agree**
//!
//! For any rows, filters and scope, a read served from a primed cache returns
//! exactly the rows a cold read returns, and both equal the rows the scope may
//! see after the spec's filters are applied.
//!
//! **Property 2: Invalidation is exact**
//!
//! Invalidating one data source turns its cached specs into misses and leaves
//! every other data source's entries in place.
//!
//! **Property 3: Expansion partitions the base chart**
//!
//! When the value list is not truncated, the groups of an expansion together
//! hold exactly the rows of the unexpanded chart.

use panorama_core::{
    apply_filters, filter_rows, CacheConfig, CanonicalQuerySpec, ColumnMetadataProvider,
    PanoramaError, QueryConfig, RawRow, RbacScope,
};
use panorama_storage::{CacheLayer, DataSourceCache};
use panorama_test_utils::generators::{arb_rows, arb_scope, arb_spec};
use panorama_test_utils::{fixtures, RecordingFetcher, StaticColumnProvider};
use proptest::prelude::*;
use std::sync::Arc;

#[path = "support/harness.rs"]
mod harness;
use harness::harness_with;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

const PROPTEST_CASES: u32 = 64;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

fn row_cache() -> DataSourceCache {
    let columns: Arc<dyn ColumnMetadataProvider> = Arc::new(StaticColumnProvider::dashboard());
    DataSourceCache::new(&CacheConfig::default(), columns)
}

fn expected_rows(rows: &[RawRow], spec: &CanonicalQuerySpec, scope: &RbacScope) -> Vec<RawRow> {
    let visible = filter_rows(rows.to_vec(), scope, "organization_id");
    apply_filters(visible, &spec.effective_filters())
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn prop_cold_and_warm_reads_agree(
        rows in arb_rows(),
        spec in arb_spec(),
        scope in arb_scope(),
    ) {
        let rt = runtime();
        let fetcher = RecordingFetcher::new().with_rows(fixtures::DASHBOARD_DS, rows.clone());

        let cold_cache = row_cache();
        let cold = rt.block_on(cold_cache.fetch(&spec, &scope, &fetcher));

        let warm_cache = row_cache();
        warm_cache.prime(&spec, rows.clone()).expect("prime");
        let warm = rt.block_on(warm_cache.fetch(&spec, &scope, &fetcher));

        if scope.is_resolvable() {
            let cold = cold.expect("cold read");
            let warm = warm.expect("warm read");
            prop_assert!(!cold.was_cache_hit());
            prop_assert!(warm.was_cache_hit());
            prop_assert_eq!(cold.value(), warm.value());
            prop_assert_eq!(cold.into_value(), expected_rows(&rows, &spec, &scope));
        } else {
            prop_assert!(matches!(cold, Err(PanoramaError::Access(_))));
            prop_assert!(matches!(warm, Err(PanoramaError::Access(_))));
        }
        // Only the cold cache ever reached the fetcher.
        prop_assert!(fetcher.row_calls() <= 1);
    }

    #[test]
    fn prop_invalidation_is_exact(
        rows in arb_rows(),
        specs in prop::collection::vec(arb_spec(), 1..4),
    ) {
        let columns: Arc<dyn ColumnMetadataProvider> = Arc::new(StaticColumnProvider::dashboard());
        let layer = CacheLayer::new(CacheConfig::default(), columns);
        let other = CanonicalQuerySpec::builder(fixtures::OTHER_DS, "Charges")
            .build()
            .expect("spec");
        layer.rows().prime(&other, Vec::new()).expect("prime other");
        for spec in &specs {
            layer.rows().prime(spec, rows.clone()).expect("prime");
        }

        // Generated specs may collide on one key.
        let dashboard_keys = layer.rows().keys_for(fixtures::DASHBOARD_DS).len();
        prop_assert!(dashboard_keys >= 1 && dashboard_keys <= specs.len());

        let removed = layer.invalidation().invalidate_data_source(fixtures::DASHBOARD_DS);
        prop_assert_eq!(removed as usize, dashboard_keys);
        for spec in &specs {
            prop_assert!(!layer.rows().contains(spec));
        }
        prop_assert!(layer.rows().contains(&other));
        prop_assert!(layer.rows().keys_for(fixtures::DASHBOARD_DS).is_empty());
    }

    #[test]
    fn prop_expansion_partitions_base_rows(
        rows in arb_rows(),
        spec in arb_spec(),
        scope in arb_scope(),
    ) {
        prop_assume!(scope.is_resolvable());
        let rt = runtime();
        let h = harness_with(
            RecordingFetcher::new().with_rows(fixtures::DASHBOARD_DS, rows.clone()),
            QueryConfig::default(),
        );

        let base = rt
            .block_on(h.orchestrator.execute(&spec, &scope))
            .expect("base read");
        let expansion = rt
            .block_on(h.orchestrator.expansion().expand(&spec, "location", &scope, Some(10)))
            .expect("expansion");

        prop_assert!(!expansion.truncated);
        let grouped: usize = expansion.groups.iter().map(|g| g.rows().len()).sum();
        prop_assert_eq!(grouped, base.rows.len());
        for group in &expansion.groups {
            prop_assert_eq!(group.spec.without_dimension_filter(), spec.clone());
            prop_assert!(group.rows().iter().all(|r| r.get("location") == Some(&group.value)));
        }
        prop_assert_eq!(h.fetcher.row_calls(), 1);
    }
}
