//! Raw rows returned by the external fetcher.
//!
//! A row is an opaque map of column name to scalar value. Rows produced by a
//! multi-series fan-out additionally carry a [`SeriesTag`]; the tag lives
//! beside the columns so annotating a row can never alter a column value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Series annotation added to rows produced by a multi-series fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesTag {
    pub series_id: String,
    pub series_label: String,
}

/// One row of a data source, keyed by column name.
///
/// Rows serialize flat with the series tag beside the columns; they are built
/// through [`RawRow::from_columns`] rather than deserialized.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RawRow {
    #[serde(flatten)]
    columns: Map<String, Value>,
    #[serde(flatten)]
    series: Option<SeriesTag>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Map<String, Value>) -> Self {
        Self {
            columns,
            series: None,
        }
    }

    /// Builder-style column setter, mostly used by fixtures.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> &Map<String, Value> {
        &self.columns
    }

    pub fn series(&self) -> Option<&SeriesTag> {
        self.series.as_ref()
    }

    /// Return this row annotated with a series tag.
    pub fn with_series(mut self, tag: SeriesTag) -> Self {
        self.series = Some(tag);
        self
    }
}

/// Render a scalar as the string used for identity comparisons.
///
/// Strings are used verbatim and numbers/booleans use their JSON rendering.
/// Null, arrays and objects have no scalar key.
pub fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Compare two scalars for equality, treating numeric strings and numbers alike.
pub fn scalar_eq(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l == r,
        _ => match (scalar_key(left), scalar_key(right)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        },
    }
}

/// Order two scalars: numerically when both are numeric, lexically otherwise.
pub fn scalar_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ => match (scalar_key(left), scalar_key(right)) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => None,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
