//! Error types for panorama operations

use crate::DataSourceId;
use std::time::Duration;
use thiserror::Error;

/// Cache backend errors.
///
/// These never reach callers of the read path: the cache is an optimization and
/// a failed write degrades to a direct fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheBackendError {
    #[error("Cache capacity of {capacity} entries exceeded")]
    CapacityExceeded { capacity: usize },

    #[error("Write for tag {tag} rejected: generation {expected} superseded by {current}")]
    StaleGeneration {
        tag: String,
        expected: u64,
        current: u64,
    },
}

/// Access control errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },
}

/// Validation errors for query specifications and column configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Data source {data_source_id} not found")]
    UnknownDataSource { data_source_id: DataSourceId },

    #[error("Column {column} not found on data source {data_source_id}")]
    UnknownColumn {
        data_source_id: DataSourceId,
        column: String,
    },

    #[error("Filter field {field} is not filterable on data source {data_source_id}")]
    InvalidFilterField {
        data_source_id: DataSourceId,
        field: String,
    },

    #[error("Column {column} on data source {data_source_id} is not an expansion dimension")]
    DimensionNotExpandable {
        data_source_id: DataSourceId,
        column: String,
    },

    #[error(
        "Expansion dimension {column} on data source {data_source_id} is not filterable"
    )]
    DimensionNotFilterable {
        data_source_id: DataSourceId,
        column: String,
    },

    #[error("Duplicate series id: {series_id}")]
    DuplicateSeriesId { series_id: String },
}

/// Errors raised while retrieving rows from the external store.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Fetch from data source {data_source_id} failed: {reason}")]
    Failed {
        data_source_id: DataSourceId,
        reason: String,
    },

    #[error("Query timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("Sub-fetch task failed: {reason}")]
    TaskFailed { reason: String },

    #[error("All {} sub-fetches failed", .failures.len())]
    AllSubFetchesFailed { failures: Vec<SubFetchFailure> },
}

/// One failed item of a multi-series or dimension-expansion fan-out.
#[derive(Debug, Clone)]
pub struct SubFetchFailure {
    /// Series id or dimension value the failure belongs to.
    pub item: String,
    pub error: PanoramaError,
}

impl SubFetchFailure {
    pub fn new(item: impl Into<String>, error: PanoramaError) -> Self {
        Self {
            item: item.into(),
            error,
        }
    }
}

/// Master error type for all panorama errors.
#[derive(Debug, Clone, Error)]
pub enum PanoramaError {
    #[error("Cache backend error: {0}")]
    CacheBackend(#[from] CacheBackendError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

impl PanoramaError {
    /// Errors that mean the request itself would return wrong or unauthorized
    /// data. These are never downgraded to a per-item failure.
    pub fn is_data_correctness(&self) -> bool {
        matches!(self, Self::Access(_) | Self::Validation(_))
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::Access(AccessError::PermissionDenied {
            reason: reason.into(),
        })
    }
}

/// Result type alias for panorama operations.
pub type PanoramaResult<T> = Result<T, PanoramaError>;

// =============================================================================
// TESTS
// =============================================================================
