//! Panorama Core - Query, Row and Access Types
//!
//! Pure data types shared by the cache and query crates, plus the traits for
//! the external collaborators (row fetcher, column metadata provider).
//! This crate performs no I/O.

pub mod columns;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod identity;
pub mod rbac;
pub mod row;
pub mod spec;

pub use columns::{
    ColumnMetadata, ColumnMetadataProvider, DataSourceColumns, DimensionValueCount, RawRowFetcher,
};
pub use config::{CacheConfig, QueryConfig};
pub use error::{
    AccessError, CacheBackendError, FetchError, PanoramaError, PanoramaResult, SubFetchFailure,
    ValidationError,
};
pub use filter::{apply_filters, FilterExpr, FilterOperator};
pub use identity::{compute_digest, CacheKey, DataSourceId, Timestamp};
pub use rbac::{filter_rows, RbacScope};
pub use row::{scalar_cmp, scalar_eq, scalar_key, RawRow, SeriesTag};
pub use spec::{
    Aggregation, CanonicalQuerySpec, DateRange, DimensionFilter, Frequency, QueryPlan,
    QuerySpecBuilder, SeriesSpec,
};
