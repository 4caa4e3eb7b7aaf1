//! Shared wiring for the query integration tests.

#![allow(dead_code)]

use panorama_core::{CacheConfig, ColumnMetadataProvider, QueryConfig, RbacScope};
use panorama_query::QueryOrchestrator;
use panorama_storage::CacheLayer;
use panorama_test_utils::{init_test_tracing, RecordingFetcher, StaticColumnProvider};
use std::sync::Arc;

pub struct Harness {
    pub layer: CacheLayer,
    pub orchestrator: QueryOrchestrator,
    pub fetcher: Arc<RecordingFetcher>,
}

pub fn harness() -> Harness {
    harness_with(RecordingFetcher::with_dashboard_rows(), QueryConfig::default())
}

pub fn harness_with(fetcher: RecordingFetcher, config: QueryConfig) -> Harness {
    init_test_tracing();
    let columns: Arc<dyn ColumnMetadataProvider> = Arc::new(StaticColumnProvider::dashboard());
    let layer = CacheLayer::new(CacheConfig::default(), Arc::clone(&columns));
    let fetcher = Arc::new(fetcher);
    let orchestrator = QueryOrchestrator::new(&layer, fetcher.clone(), columns, config);
    Harness {
        layer,
        orchestrator,
        fetcher,
    }
}

/// Organizations 101 and 102: Downtown and Uptown, never Airport.
pub fn clinic_scope() -> RbacScope {
    RbacScope::organizations(["101", "102"])
}
