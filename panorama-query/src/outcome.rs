//! Results returned to chart handlers.

use panorama_core::{CanonicalQuerySpec, PanoramaError, RawRow, SubFetchFailure};
use serde_json::Value;

/// One failed series or dimension value inside an otherwise usable result.
pub type PartialFetchFailure = SubFetchFailure;

/// Rows for one chart, plus the sub-fetches that failed.
///
/// An empty `failures` list means the result is complete. Handlers render the
/// rows they got and surface the failures as a warning.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub rows: Vec<RawRow>,
    pub failures: Vec<PartialFetchFailure>,
}

impl QueryOutcome {
    pub fn complete(rows: Vec<RawRow>) -> Self {
        Self {
            rows,
            failures: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// The panel for one dimension value.
#[derive(Debug, Clone)]
pub struct DimensionGroup {
    pub value: Value,
    /// The base spec plus this value's equality predicate.
    pub spec: CanonicalQuerySpec,
    pub result: Result<QueryOutcome, PanoramaError>,
}

impl DimensionGroup {
    pub fn rows(&self) -> &[RawRow] {
        self.result.as_ref().map(|o| o.rows.as_slice()).unwrap_or(&[])
    }
}

/// A chart expanded into one group per dimension value, in value order.
#[derive(Debug, Clone)]
pub struct DimensionExpansion {
    pub column: String,
    pub groups: Vec<DimensionGroup>,
    /// Distinct values visible to the caller before the limit was applied.
    pub total_distinct: usize,
    pub truncated: bool,
}

impl DimensionExpansion {
    pub fn failed_groups(&self) -> impl Iterator<Item = &DimensionGroup> {
        self.groups.iter().filter(|g| g.result.is_err())
    }
}

/// What a chart request produced.
#[derive(Debug, Clone)]
pub enum ChartResponse {
    Rows(QueryOutcome),
    Expanded(DimensionExpansion),
}
