//! Panorama Storage - Caching Layer
//!
//! In-memory caches for raw row sets and dimension values, access control
//! applied on every read, and the coordinator through which all invalidation
//! flows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         CacheLayer                           │
//! │  ┌──────────────────┐  ┌────────────────────┐                │
//! │  │ DataSourceCache  │  │ DimensionValueCache│                │
//! │  │ (rows, RBAC on   │  │ (per-org counts,   │                │
//! │  │  every read)     │  │  ranked per caller)│                │
//! │  └────────┬─────────┘  └─────────┬──────────┘                │
//! │           │  CacheStore<V>       │  CacheStore<V>            │
//! │           └──────────┬───────────┘                           │
//! │                      │                                       │
//! │            InvalidationCoordinator                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod data_source;
pub mod dimension_values;
pub mod invalidation;
pub mod layer;
pub mod sweeper;

pub use cache::{CacheRead, CacheStats, CacheStore, ReadSource};
pub use data_source::{apply_read_filters, DataSourceCache, FilteredRows};
pub use dimension_values::{rank_values, DimensionValueCache, DimensionValueSet};
pub use invalidation::{InvalidationCoordinator, InvalidationReport, MutationEvent};
pub use layer::{CacheLayer, SweepReport};
pub use sweeper::{sweep_task, SweepMetrics, SweepSnapshot};
