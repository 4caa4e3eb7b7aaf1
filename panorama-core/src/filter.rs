//! Filter expressions applied to raw rows.
//!
//! The same [`FilterExpr`] is hashed into cache keys, pushed down to the
//! fetcher where it can be, and evaluated in memory on every read.

use crate::row::{scalar_cmp, scalar_eq, scalar_key, RawRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (for strings)
    Contains,
    /// In list of values
    In,
    /// Not in list of values
    NotIn,
}

/// A single predicate over one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against (a scalar, or an array for `in`/`not_in`)
    pub value: Value,
}

impl FilterExpr {
    /// Create a new filter expression.
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create an inclusion filter.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOperator::In, Value::Array(values))
    }

    /// Evaluate the predicate against a row.
    ///
    /// A row without the field never matches, whatever the operator.
    pub fn matches(&self, row: &RawRow) -> bool {
        let Some(actual) = row.get(&self.field) else {
            return false;
        };
        if actual.is_null() {
            return false;
        }

        match self.operator {
            FilterOperator::Eq => scalar_eq(actual, &self.value),
            FilterOperator::Ne => !scalar_eq(actual, &self.value),
            FilterOperator::Gt => scalar_cmp(actual, &self.value) == Some(Ordering::Greater),
            FilterOperator::Lt => scalar_cmp(actual, &self.value) == Some(Ordering::Less),
            FilterOperator::Gte => matches!(
                scalar_cmp(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOperator::Lte => matches!(
                scalar_cmp(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOperator::Contains => match (scalar_key(actual), scalar_key(&self.value)) {
                (Some(haystack), Some(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            FilterOperator::In => self.list().iter().any(|v| scalar_eq(actual, v)),
            FilterOperator::NotIn => !self.list().iter().any(|v| scalar_eq(actual, v)),
        }
    }

    /// Sort key used to canonicalize filter lists before hashing.
    pub(crate) fn canonical_order(&self, other: &Self) -> Ordering {
        self.field
            .cmp(&other.field)
            .then(self.operator.cmp(&other.operator))
            .then_with(|| self.value.to_string().cmp(&other.value.to_string()))
    }

    /// Sort and dedup the values of a list operator. List order never changes
    /// which rows match, so it must not change the cache key either.
    pub(crate) fn canonicalize_list(&mut self) {
        if !matches!(self.operator, FilterOperator::In | FilterOperator::NotIn) {
            return;
        }
        if let Value::Array(values) = &mut self.value {
            values.sort_by_cached_key(|v| v.to_string());
            values.dedup();
        }
    }

    fn list(&self) -> &[Value] {
        match &self.value {
            Value::Array(values) => values,
            single => std::slice::from_ref(single),
        }
    }
}

/// Keep only the rows matching every filter.
pub fn apply_filters(rows: Vec<RawRow>, filters: &[FilterExpr]) -> Vec<RawRow> {
    if filters.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| filters.iter().all(|f| f.matches(row)))
        .collect()
}
