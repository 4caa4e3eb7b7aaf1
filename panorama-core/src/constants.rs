//! Default values for cache and query configuration.
//!
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// CACHE
// ============================================================================

/// Row cache TTL in seconds (48 hours)
pub const DEFAULT_ROW_CACHE_TTL_SECS: u64 = 172_800;

/// Dimension value cache TTL in seconds (12 hours)
pub const DEFAULT_DIMENSION_CACHE_TTL_SECS: u64 = 43_200;

/// Maximum number of raw row sets held in memory
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 50_000;

/// Maximum number of dimension value sets held in memory
pub const DEFAULT_DIMENSION_CACHE_MAX_ENTRIES: usize = 10_000;

/// How often the sweeper removes expired entries, in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Row column carrying the organization identifier used for access control
pub const DEFAULT_RBAC_COLUMN: &str = "organization_id";

// ============================================================================
// QUERY EXECUTION
// ============================================================================

/// Number of dimension values expanded when the caller gives no limit
pub const DEFAULT_EXPANSION_LIMIT: usize = 20;

/// Upper bound on dimension values expanded in one request
pub const MAX_EXPANSION_LIMIT: usize = 50;

/// Concurrent per-value fetches during dimension expansion
pub const DEFAULT_EXPANSION_CONCURRENCY: usize = 4;

/// Concurrent per-series fetches during multi-series fan-out
pub const DEFAULT_SERIES_CONCURRENCY: usize = 8;

/// Upper bound on one chart request, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
