//! The single entry point for cache invalidation.
//!
//! Admin operations call the coordinator synchronously, before reporting
//! success, so the next read after a mutation never sees pre-mutation data.

use crate::data_source::DataSourceCache;
use crate::dimension_values::DimensionValueCache;
use panorama_core::DataSourceId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A mutation that affects cached data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationEvent {
    ChartUpdated { data_source_id: DataSourceId },
    ChartDeleted { data_source_id: DataSourceId },
    ColumnMetadataChanged {
        data_source_id: DataSourceId,
        column: String,
    },
    DataSourceDeleted { data_source_id: DataSourceId },
}

impl MutationEvent {
    pub fn data_source_id(&self) -> DataSourceId {
        match self {
            Self::ChartUpdated { data_source_id }
            | Self::ChartDeleted { data_source_id }
            | Self::ColumnMetadataChanged { data_source_id, .. }
            | Self::DataSourceDeleted { data_source_id } => *data_source_id,
        }
    }
}

/// What one invalidation removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub row_sets_removed: u64,
    pub value_sets_removed: u64,
}

#[derive(Clone)]
pub struct InvalidationCoordinator {
    rows: Arc<DataSourceCache>,
    dimensions: Arc<DimensionValueCache>,
}

impl InvalidationCoordinator {
    pub fn new(rows: Arc<DataSourceCache>, dimensions: Arc<DimensionValueCache>) -> Self {
        Self { rows, dimensions }
    }

    /// Remove every cached row set of a data source, whatever spec produced it.
    pub fn invalidate_data_source(&self, data_source_id: DataSourceId) -> u64 {
        let removed = self.rows.invalidate(data_source_id);
        info!(data_source_id = %data_source_id, removed, "Invalidated data source row cache");
        removed
    }

    /// Remove the cached value set of one column. Row data is untouched.
    pub fn invalidate_dimension_values(&self, data_source_id: DataSourceId, column: &str) -> u64 {
        let removed = self.dimensions.invalidate(data_source_id, column);
        info!(
            data_source_id = %data_source_id,
            column,
            removed,
            "Invalidated dimension values"
        );
        removed
    }

    /// Apply the invalidations a mutation requires.
    pub fn handle(&self, event: &MutationEvent) -> InvalidationReport {
        let data_source_id = event.data_source_id();
        match event {
            MutationEvent::ChartUpdated { .. } | MutationEvent::ChartDeleted { .. } => {
                InvalidationReport {
                    row_sets_removed: self.invalidate_data_source(data_source_id),
                    value_sets_removed: 0,
                }
            }
            MutationEvent::ColumnMetadataChanged { column, .. } => InvalidationReport {
                row_sets_removed: self.invalidate_data_source(data_source_id),
                value_sets_removed: self.invalidate_dimension_values(data_source_id, column),
            },
            MutationEvent::DataSourceDeleted { .. } => {
                let row_sets_removed = self.invalidate_data_source(data_source_id);
                let value_sets_removed = self.dimensions.invalidate_data_source(data_source_id);
                info!(
                    data_source_id = %data_source_id,
                    removed = value_sets_removed,
                    "Invalidated all dimension values of deleted data source"
                );
                InvalidationReport {
                    row_sets_removed,
                    value_sets_removed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panorama_core::{CacheConfig, CanonicalQuerySpec, RbacScope};
    use panorama_test_utils::{fixtures, RecordingFetcher, StaticColumnProvider};

    struct Harness {
        rows: Arc<DataSourceCache>,
        dimensions: Arc<DimensionValueCache>,
        coordinator: InvalidationCoordinator,
        fetcher: RecordingFetcher,
    }

    fn harness() -> Harness {
        let config = CacheConfig::default();
        let rows = Arc::new(DataSourceCache::new(
            &config,
            Arc::new(StaticColumnProvider::dashboard()),
        ));
        let dimensions = Arc::new(DimensionValueCache::new(&config));
        Harness {
            coordinator: InvalidationCoordinator::new(Arc::clone(&rows), Arc::clone(&dimensions)),
            rows,
            dimensions,
            fetcher: RecordingFetcher::with_dashboard_rows(),
        }
    }

    async fn warm(h: &Harness) {
        let scope = RbacScope::organizations(["101"]);
        h.rows
            .fetch(&fixtures::charges_spec(), &scope, &h.fetcher)
            .await
            .unwrap();
        let other = CanonicalQuerySpec::builder(fixtures::OTHER_DS, "Charges")
            .build()
            .unwrap();
        h.rows.fetch(&other, &scope, &h.fetcher).await.unwrap();
        for column in ["location", "month"] {
            h.dimensions
                .values(fixtures::DASHBOARD_DS, column, &scope, 5, &h.fetcher)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_chart_update_purges_rows_only() {
        let h = harness();
        warm(&h).await;

        let report = h.coordinator.handle(&MutationEvent::ChartUpdated {
            data_source_id: fixtures::DASHBOARD_DS,
        });
        assert_eq!(report.row_sets_removed, 1);
        assert_eq!(report.value_sets_removed, 0);
        assert!(!h.rows.contains(&fixtures::charges_spec()));
        assert_eq!(h.rows.len(), 1);
        assert_eq!(h.dimensions.len(), 2);
    }

    #[tokio::test]
    async fn test_column_change_purges_rows_and_that_column() {
        let h = harness();
        warm(&h).await;

        let report = h.coordinator.handle(&MutationEvent::ColumnMetadataChanged {
            data_source_id: fixtures::DASHBOARD_DS,
            column: "location".to_string(),
        });
        assert_eq!(report.row_sets_removed, 1);
        assert_eq!(report.value_sets_removed, 1);
        assert!(h.dimensions.contains(fixtures::DASHBOARD_DS, "month"));
    }

    #[tokio::test]
    async fn test_data_source_deleted_purges_everything_for_source() {
        let h = harness();
        warm(&h).await;

        let report = h.coordinator.handle(&MutationEvent::DataSourceDeleted {
            data_source_id: fixtures::DASHBOARD_DS,
        });
        assert_eq!(report.value_sets_removed, 2);
        assert!(h.dimensions.is_empty());
        assert_eq!(h.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_invalidation_keeps_rows() {
        let h = harness();
        warm(&h).await;

        assert_eq!(
            h.coordinator
                .invalidate_dimension_values(fixtures::DASHBOARD_DS, "location"),
            1
        );
        assert!(h.rows.contains(&fixtures::charges_spec()));
    }

    #[test]
    fn test_event_serde_shape() {
        let event: MutationEvent = serde_json::from_value(serde_json::json!({
            "type": "column_metadata_changed",
            "data_source_id": 7,
            "column": "location"
        }))
        .unwrap();
        assert_eq!(event.data_source_id(), DataSourceId::new(7));
    }
}
