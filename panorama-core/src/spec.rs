//! Canonical query specifications.
//!
//! A [`CanonicalQuerySpec`] is the normalized, hashable description of the
//! data one chart needs. It is only constructed through [`QuerySpecBuilder`],
//! which validates the input and canonicalizes filter order, so two specs
//! that mean the same thing always produce the same [`CacheKey`].
//!
//! The execution strategy is an explicit discriminant ([`QueryPlan`]); the
//! optional dimension predicate is orthogonal to it so that a dimension
//! expansion of a multi-series chart keeps every series.

use crate::error::{PanoramaResult, ValidationError};
use crate::filter::{FilterExpr, FilterOperator};
use crate::identity::{CacheKey, DataSourceId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Namespace prefix for raw row cache keys.
pub const ROW_KEY_NAMESPACE: &str = "rows";

/// Time bucketing of a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        };
        f.write_str(s)
    }
}

/// Aggregation applied to a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> PanoramaResult<Self> {
        if start > end {
            return Err(ValidationError::InvalidValue {
                field: "date_range".to_string(),
                reason: format!("start {} is after end {}", start, end),
            }
            .into());
        }
        Ok(Self { start, end })
    }
}

/// One measure of a multi-series chart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesSpec {
    pub id: String,
    pub label: String,
    pub measure: String,
    pub aggregation: Option<Aggregation>,
}

impl SeriesSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>, measure: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            measure: measure.into(),
            aggregation: None,
        }
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }
}

/// Equality predicate injected by dimension expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionFilter {
    pub field: String,
    pub value: Value,
}

impl DimensionFilter {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    pub fn as_filter(&self) -> FilterExpr {
        FilterExpr::new(self.field.clone(), FilterOperator::Eq, self.value.clone())
    }
}

/// How a spec is executed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", content = "series", rename_all = "snake_case")]
pub enum QueryPlan {
    /// One fetch for the spec's measure.
    Single,
    /// One fetch per series, run concurrently and merged in series order.
    MultiSeries(Vec<SeriesSpec>),
}

/// Normalized query for one chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalQuerySpec {
    data_source_id: DataSourceId,
    measure: String,
    frequency: Option<Frequency>,
    group_by: Option<String>,
    date_range: Option<DateRange>,
    aggregation: Option<Aggregation>,
    advanced_filters: Vec<FilterExpr>,
    plan: QueryPlan,
    dimension_filter: Option<DimensionFilter>,
}

/// Fields that identify a raw row set. Everything else is applied in memory.
#[derive(Serialize)]
struct KeyMaterial<'a> {
    data_source_id: DataSourceId,
    measure: &'a str,
    frequency: Option<Frequency>,
    group_by: Option<&'a str>,
    date_range: Option<&'a DateRange>,
    aggregation: Option<Aggregation>,
    advanced_filters: &'a [FilterExpr],
}

impl CanonicalQuerySpec {
    pub fn builder(data_source_id: DataSourceId, measure: impl Into<String>) -> QuerySpecBuilder {
        QuerySpecBuilder::new(data_source_id, measure)
    }

    pub fn data_source_id(&self) -> DataSourceId {
        self.data_source_id
    }

    pub fn measure(&self) -> &str {
        &self.measure
    }

    pub fn frequency(&self) -> Option<Frequency> {
        self.frequency
    }

    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    pub fn aggregation(&self) -> Option<Aggregation> {
        self.aggregation
    }

    /// Filters chosen by the chart author, in canonical order.
    pub fn advanced_filters(&self) -> &[FilterExpr] {
        &self.advanced_filters
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn dimension_filter(&self) -> Option<&DimensionFilter> {
        self.dimension_filter.as_ref()
    }

    /// Every predicate a returned row must satisfy: the advanced filters plus
    /// the dimension predicate, if any.
    pub fn effective_filters(&self) -> Vec<FilterExpr> {
        let mut filters = self.advanced_filters.clone();
        if let Some(dimension) = &self.dimension_filter {
            filters.push(dimension.as_filter());
        }
        filters
    }

    /// Key of the raw (unfiltered, organization-agnostic) row set.
    ///
    /// The series list and the dimension predicate are not part of the key:
    /// series are fetched through their own derived specs and the dimension
    /// predicate is applied in memory over the shared raw rows.
    pub fn cache_key(&self) -> CacheKey {
        let material = KeyMaterial {
            data_source_id: self.data_source_id,
            measure: &self.measure,
            frequency: self.frequency,
            group_by: self.group_by.as_deref(),
            date_range: self.date_range.as_ref(),
            aggregation: self.aggregation,
            advanced_filters: &self.advanced_filters,
        };
        // Serializing plain structs, strings and JSON scalars cannot fail.
        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        CacheKey::digest(ROW_KEY_NAMESPACE, self.data_source_id, &bytes)
    }

    /// Derived spec for one series: same filters, measure overridden, single plan.
    pub fn for_series(&self, series: &SeriesSpec) -> Self {
        Self {
            measure: series.measure.clone(),
            aggregation: series.aggregation.or(self.aggregation),
            plan: QueryPlan::Single,
            ..self.clone()
        }
    }

    /// This spec with one more equality predicate. Every other field is kept.
    pub fn with_dimension_filter(&self, filter: DimensionFilter) -> Self {
        Self {
            dimension_filter: Some(filter),
            ..self.clone()
        }
    }

    /// The spec handed to the external fetcher on a miss.
    pub fn without_dimension_filter(&self) -> Self {
        Self {
            dimension_filter: None,
            ..self.clone()
        }
    }
}

/// Validating builder for [`CanonicalQuerySpec`].
#[derive(Debug, Clone)]
pub struct QuerySpecBuilder {
    data_source_id: DataSourceId,
    measure: String,
    frequency: Option<Frequency>,
    group_by: Option<String>,
    date_range: Option<DateRange>,
    aggregation: Option<Aggregation>,
    advanced_filters: Vec<FilterExpr>,
    series: Vec<SeriesSpec>,
    dimension_filter: Option<DimensionFilter>,
}

impl QuerySpecBuilder {
    pub fn new(data_source_id: DataSourceId, measure: impl Into<String>) -> Self {
        Self {
            data_source_id,
            measure: measure.into(),
            frequency: None,
            group_by: None,
            date_range: None,
            aggregation: None,
            advanced_filters: Vec::new(),
            series: Vec::new(),
            dimension_filter: None,
        }
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.advanced_filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: impl IntoIterator<Item = FilterExpr>) -> Self {
        self.advanced_filters.extend(filters);
        self
    }

    pub fn series(mut self, series: SeriesSpec) -> Self {
        self.series.push(series);
        self
    }

    pub fn dimension_filter(mut self, filter: DimensionFilter) -> Self {
        self.dimension_filter = Some(filter);
        self
    }

    pub fn build(self) -> PanoramaResult<CanonicalQuerySpec> {
        if self.measure.trim().is_empty() {
            return Err(required("measure"));
        }
        if self.group_by.as_deref().is_some_and(|g| g.trim().is_empty()) {
            return Err(invalid("group_by", "column name is empty"));
        }

        for filter in &self.advanced_filters {
            if filter.field.trim().is_empty() {
                return Err(invalid("advanced_filters", "filter field is empty"));
            }
            let is_list = matches!(filter.operator, FilterOperator::In | FilterOperator::NotIn);
            if is_list && !filter.value.is_array() {
                return Err(invalid(
                    "advanced_filters",
                    &format!("operator on {} expects a list of values", filter.field),
                ));
            }
        }

        if let Some(dimension) = &self.dimension_filter {
            if dimension.field.trim().is_empty() {
                return Err(invalid("dimension_filter", "field is empty"));
            }
        }

        let plan = if self.series.is_empty() {
            QueryPlan::Single
        } else {
            let mut seen = HashSet::new();
            for series in &self.series {
                if series.id.trim().is_empty() {
                    return Err(required("series.id"));
                }
                if series.measure.trim().is_empty() {
                    return Err(required("series.measure"));
                }
                if !seen.insert(series.id.as_str()) {
                    return Err(ValidationError::DuplicateSeriesId {
                        series_id: series.id.clone(),
                    }
                    .into());
                }
            }
            QueryPlan::MultiSeries(self.series)
        };

        let mut advanced_filters = self.advanced_filters;
        advanced_filters
            .iter_mut()
            .for_each(FilterExpr::canonicalize_list);
        advanced_filters.sort_by(|a, b| a.canonical_order(b));
        advanced_filters.dedup();

        Ok(CanonicalQuerySpec {
            data_source_id: self.data_source_id,
            measure: self.measure,
            frequency: self.frequency,
            group_by: self.group_by,
            date_range: self.date_range,
            aggregation: self.aggregation,
            advanced_filters,
            plan,
            dimension_filter: self.dimension_filter,
        })
    }
}

fn required(field: &str) -> crate::PanoramaError {
    ValidationError::RequiredFieldMissing {
        field: field.to_string(),
    }
    .into()
}

fn invalid(field: &str, reason: &str) -> crate::PanoramaError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("date"),
            NaiveDate::from_ymd_opt(2024, 6, 30).expect("date"),
        )
        .expect("range")
    }

    fn base() -> QuerySpecBuilder {
        CanonicalQuerySpec::builder(DataSourceId::new(7), "Charges")
            .frequency(Frequency::Monthly)
            .date_range(range())
    }

    #[test]
    fn test_filter_order_does_not_change_key() {
        let a = base()
            .filter(FilterExpr::eq("location", json!("Downtown")))
            .filter(FilterExpr::eq("provider", json!("Dr. Alvarez")))
            .build()
            .expect("spec");
        let b = base()
            .filter(FilterExpr::eq("provider", json!("Dr. Alvarez")))
            .filter(FilterExpr::eq("location", json!("Downtown")))
            .build()
            .expect("spec");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_filters_collapse() {
        let spec = base()
            .filter(FilterExpr::eq("location", json!("Downtown")))
            .filter(FilterExpr::eq("location", json!("Downtown")))
            .build()
            .expect("spec");
        assert_eq!(spec.advanced_filters().len(), 1);
    }

    #[test]
    fn test_semantic_fields_change_key() {
        let monthly = base().build().expect("spec");
        let weekly = base().frequency(Frequency::Weekly).build().expect("spec");
        let other_source = CanonicalQuerySpec::builder(DataSourceId::new(8), "Charges")
            .frequency(Frequency::Monthly)
            .date_range(range())
            .build()
            .expect("spec");
        assert_ne!(monthly.cache_key(), weekly.cache_key());
        assert_ne!(monthly.cache_key(), other_source.cache_key());
    }

    #[test]
    fn test_series_and_dimension_excluded_from_key() {
        let plain = base().build().expect("spec");
        let with_series = base()
            .series(SeriesSpec::new("a", "Charges A", "Charges"))
            .build()
            .expect("spec");
        let expanded = plain.with_dimension_filter(DimensionFilter::new("location", json!("Uptown")));
        assert_eq!(plain.cache_key(), with_series.cache_key());
        assert_eq!(plain.cache_key(), expanded.cache_key());
    }

    #[test]
    fn test_with_dimension_filter_preserves_everything_else() {
        let spec = base()
            .filter(FilterExpr::eq("payer", json!("Medicare")))
            .series(SeriesSpec::new("charges", "Charges", "Charges"))
            .series(SeriesSpec::new("payments", "Payments", "Payments"))
            .build()
            .expect("spec");
        let derived = spec.with_dimension_filter(DimensionFilter::new("location", json!("Downtown")));

        assert_eq!(derived.plan(), spec.plan());
        assert_eq!(derived.advanced_filters(), spec.advanced_filters());
        assert_eq!(derived.date_range(), spec.date_range());
        assert_eq!(derived.without_dimension_filter(), spec);
        assert_eq!(derived.effective_filters().len(), spec.advanced_filters().len() + 1);
    }

    #[test]
    fn test_for_series_overrides_measure_only() {
        let spec = base()
            .aggregation(Aggregation::Sum)
            .series(SeriesSpec::new("p", "Payments", "Payments").with_aggregation(Aggregation::Avg))
            .build()
            .expect("spec");
        let QueryPlan::MultiSeries(series) = spec.plan() else {
            panic!("expected multi-series plan");
        };
        let derived = spec.for_series(&series[0]);
        assert_eq!(derived.measure(), "Payments");
        assert_eq!(derived.aggregation(), Some(Aggregation::Avg));
        assert_eq!(derived.plan(), &QueryPlan::Single);
        assert_eq!(derived.advanced_filters(), spec.advanced_filters());
    }

    #[test]
    fn test_builder_rejects_invalid_input() {
        assert!(CanonicalQuerySpec::builder(DataSourceId::new(1), " ").build().is_err());
        let dup = base()
            .series(SeriesSpec::new("a", "A", "Charges"))
            .series(SeriesSpec::new("a", "A again", "Payments"))
            .build();
        assert!(matches!(
            dup,
            Err(crate::PanoramaError::Validation(ValidationError::DuplicateSeriesId { .. }))
        ));
        let bad_in = base()
            .filter(FilterExpr::new("location", FilterOperator::In, json!("Downtown")))
            .build();
        assert!(bad_in.is_err());
    }

    #[test]
    fn test_date_range_order() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        assert!(DateRange::new(start, end).is_err());
    }

    fn filter_strategy() -> impl Strategy<Value = FilterExpr> {
        let field = prop_oneof![Just("location"), Just("provider"), Just("payer")];
        prop_oneof![
            (field.clone(), 0u8..5).prop_map(|(field, v)| FilterExpr::eq(field, json!(v))),
            (field, prop::collection::vec(0u8..5, 1..4)).prop_map(|(field, vs)| {
                FilterExpr::is_in(field, vs.into_iter().map(|v| json!(v)).collect())
            }),
        ]
    }

    /// Deterministic rotation plus reversal stands in for a shuffle.
    fn scramble<T>(items: &mut [T], seed: u64) {
        if !items.is_empty() {
            let n = (seed as usize) % items.len();
            items.rotate_left(n);
            items.reverse();
        }
    }

    #[test]
    fn test_in_list_order_does_not_change_key() {
        let a = base()
            .filter(FilterExpr::is_in("location", vec![json!("Downtown"), json!("Uptown")]))
            .build()
            .expect("spec");
        let b = base()
            .filter(FilterExpr::is_in("location", vec![json!("Uptown"), json!("Downtown")]))
            .build()
            .expect("spec");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a, b);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: the cache key is independent of filter insertion order
        /// and of the order of values inside list filters.
        #[test]
        fn prop_key_ignores_filter_order(
            filters in prop::collection::vec(filter_strategy(), 0..6),
            seed in any::<u64>(),
        ) {
            let mut shuffled = filters.clone();
            scramble(&mut shuffled, seed);
            for filter in &mut shuffled {
                if let Value::Array(values) = &mut filter.value {
                    scramble(values, seed.rotate_left(7));
                }
            }
            let a = base().filters(filters).build().expect("spec");
            let b = base().filters(shuffled).build().expect("spec");
            prop_assert_eq!(a.cache_key(), b.cache_key());
        }
    }
}
