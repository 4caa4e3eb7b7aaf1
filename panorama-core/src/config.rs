//! Configuration for the cache layer and query execution.
//!
//! Both structs follow the same pattern: `Default` uses the constants in
//! [`crate::constants`], `from_env()` overrides them from `PANORAMA_*`
//! variables, and `with_*` setters adjust individual values.

use crate::constants::*;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the row and dimension value caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for raw row sets.
    pub row_ttl: Duration,
    /// TTL for dimension value sets.
    pub dimension_ttl: Duration,
    /// Maximum raw row sets held.
    pub max_entries: usize,
    /// Maximum dimension value sets held.
    pub dimension_max_entries: usize,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
    /// Row column holding the organization identifier.
    pub rbac_column: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            row_ttl: Duration::from_secs(DEFAULT_ROW_CACHE_TTL_SECS),
            dimension_ttl: Duration::from_secs(DEFAULT_DIMENSION_CACHE_TTL_SECS),
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            dimension_max_entries: DEFAULT_DIMENSION_CACHE_MAX_ENTRIES,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            rbac_column: DEFAULT_RBAC_COLUMN.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `PANORAMA_ROW_CACHE_TTL_SECS`: Row cache TTL (default: 172800)
    /// - `PANORAMA_DIMENSION_CACHE_TTL_SECS`: Dimension value TTL (default: 43200)
    /// - `PANORAMA_CACHE_MAX_ENTRIES`: Row cache capacity (default: 50000)
    /// - `PANORAMA_DIMENSION_CACHE_MAX_ENTRIES`: Dimension cache capacity (default: 10000)
    /// - `PANORAMA_SWEEP_INTERVAL_SECS`: Sweeper interval (default: 300)
    /// - `PANORAMA_RBAC_COLUMN`: Organization identifier column (default: organization_id)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            row_ttl: env_secs("PANORAMA_ROW_CACHE_TTL_SECS").unwrap_or(defaults.row_ttl),
            dimension_ttl: env_secs("PANORAMA_DIMENSION_CACHE_TTL_SECS")
                .unwrap_or(defaults.dimension_ttl),
            max_entries: env_parse("PANORAMA_CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            dimension_max_entries: env_parse("PANORAMA_DIMENSION_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.dimension_max_entries),
            sweep_interval: env_secs("PANORAMA_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.sweep_interval),
            rbac_column: std::env::var("PANORAMA_RBAC_COLUMN")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.rbac_column),
        }
    }

    pub fn with_row_ttl(mut self, ttl: Duration) -> Self {
        self.row_ttl = ttl;
        self
    }

    pub fn with_dimension_ttl(mut self, ttl: Duration) -> Self {
        self.dimension_ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_dimension_max_entries(mut self, max: usize) -> Self {
        self.dimension_max_entries = max;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_rbac_column(mut self, column: impl Into<String>) -> Self {
        self.rbac_column = column.into();
        self
    }
}

/// Configuration for query orchestration and dimension expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// Values expanded when the caller gives no limit.
    pub expansion_default_limit: usize,
    /// Upper bound on values expanded in one request.
    pub expansion_max_limit: usize,
    /// Concurrent per-value fetches during expansion.
    pub expansion_concurrency: usize,
    /// Concurrent per-series fetches.
    pub series_concurrency: usize,
    /// Upper bound on one `execute` call, sub-fetches included.
    pub request_timeout: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            expansion_default_limit: DEFAULT_EXPANSION_LIMIT,
            expansion_max_limit: MAX_EXPANSION_LIMIT,
            expansion_concurrency: DEFAULT_EXPANSION_CONCURRENCY,
            series_concurrency: DEFAULT_SERIES_CONCURRENCY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create QueryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `PANORAMA_EXPANSION_DEFAULT_LIMIT`: Default expansion limit (default: 20)
    /// - `PANORAMA_EXPANSION_MAX_LIMIT`: Maximum expansion limit (default: 50)
    /// - `PANORAMA_EXPANSION_CONCURRENCY`: Expansion workers (default: 4)
    /// - `PANORAMA_SERIES_CONCURRENCY`: Series workers (default: 8)
    /// - `PANORAMA_REQUEST_TIMEOUT_SECS`: Request timeout (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            expansion_default_limit: env_parse("PANORAMA_EXPANSION_DEFAULT_LIMIT")
                .unwrap_or(defaults.expansion_default_limit),
            expansion_max_limit: env_parse("PANORAMA_EXPANSION_MAX_LIMIT")
                .unwrap_or(defaults.expansion_max_limit),
            expansion_concurrency: env_parse("PANORAMA_EXPANSION_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.expansion_concurrency),
            series_concurrency: env_parse("PANORAMA_SERIES_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.series_concurrency),
            request_timeout: env_secs("PANORAMA_REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// Clamp a requested expansion limit to `[1, expansion_max_limit]`.
    pub fn effective_expansion_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.expansion_default_limit)
            .clamp(1, self.expansion_max_limit.max(1))
    }

    pub fn with_expansion_limits(mut self, default_limit: usize, max_limit: usize) -> Self {
        self.expansion_default_limit = default_limit;
        self.expansion_max_limit = max_limit;
        self
    }

    pub fn with_expansion_concurrency(mut self, workers: usize) -> Self {
        self.expansion_concurrency = workers.max(1);
        self
    }

    pub fn with_series_concurrency(mut self, workers: usize) -> Self {
        self.series_concurrency = workers.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}
