//! The cache layer as one injectable unit.

use crate::data_source::DataSourceCache;
use crate::dimension_values::DimensionValueCache;
use crate::invalidation::InvalidationCoordinator;
use panorama_core::{CacheConfig, ColumnMetadataProvider};
use std::sync::Arc;

/// Entries removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub row_sets: u64,
    pub value_sets: u64,
}

/// Row cache, dimension value cache and their invalidation coordinator,
/// built from one [`CacheConfig`].
#[derive(Clone)]
pub struct CacheLayer {
    rows: Arc<DataSourceCache>,
    dimensions: Arc<DimensionValueCache>,
    invalidation: InvalidationCoordinator,
    config: CacheConfig,
}

impl CacheLayer {
    pub fn new(config: CacheConfig, columns: Arc<dyn ColumnMetadataProvider>) -> Self {
        let rows = Arc::new(DataSourceCache::new(&config, columns));
        let dimensions = Arc::new(DimensionValueCache::new(&config));
        let invalidation =
            InvalidationCoordinator::new(Arc::clone(&rows), Arc::clone(&dimensions));
        Self {
            rows,
            dimensions,
            invalidation,
            config,
        }
    }

    pub fn rows(&self) -> &Arc<DataSourceCache> {
        &self.rows
    }

    pub fn dimensions(&self) -> &Arc<DimensionValueCache> {
        &self.dimensions
    }

    pub fn invalidation(&self) -> &InvalidationCoordinator {
        &self.invalidation
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drop expired entries from both stores.
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            row_sets: self.rows.sweep(),
            value_sets: self.dimensions.sweep(),
        }
    }
}
