//! Chart configuration as authored, and its normalization.
//!
//! `ChartConfig` mirrors what the chart editor stores: a loose bag of optional
//! fields, many of them presentational or specific to one chart type. Only
//! [`ChartConfig::to_spec`] reads it; everything downstream works on the
//! validated [`CanonicalQuerySpec`].

use chrono::NaiveDate;
use panorama_core::{
    Aggregation, CanonicalQuerySpec, DataSourceId, DateRange, FilterExpr, Frequency,
    PanoramaResult, SeriesSpec, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One series of a multi-series chart, as configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesConfig {
    pub id: Option<String>,
    pub label: Option<String>,
    pub measure: String,
    pub aggregation: Option<Aggregation>,
    /// Presentational.
    pub color: Option<String>,
}

/// A chart's stored configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    pub data_source_id: Option<DataSourceId>,
    pub measure: Option<String>,
    pub frequency: Option<Frequency>,
    pub group_by: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub aggregation: Option<Aggregation>,
    #[serde(default)]
    pub advanced_filters: Vec<FilterExpr>,
    #[serde(default)]
    pub series_configs: Vec<SeriesConfig>,

    // Presentational fields. Never part of the query.
    pub title: Option<String>,
    pub chart_type: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    pub dual_axis: Option<Value>,

    /// Chart-type specific settings the query does not use.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChartConfig {
    /// Normalize into a canonical spec.
    ///
    /// The data source is required. The measure is required unless series are
    /// configured, in which case the first series' measure is the base measure.
    /// A date range needs both ends.
    pub fn to_spec(&self) -> PanoramaResult<CanonicalQuerySpec> {
        let data_source_id = self
            .data_source_id
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "dataSourceId".to_string(),
            })?;

        let measure = self
            .measure
            .clone()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| self.series_configs.first().map(|s| s.measure.clone()))
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "measure".to_string(),
            })?;

        let mut builder = CanonicalQuerySpec::builder(data_source_id, measure)
            .filters(self.advanced_filters.iter().cloned());
        if let Some(frequency) = self.frequency {
            builder = builder.frequency(frequency);
        }
        if let Some(group_by) = &self.group_by {
            builder = builder.group_by(group_by.clone());
        }
        if let Some(aggregation) = self.aggregation {
            builder = builder.aggregation(aggregation);
        }
        if let Some(range) = self.date_range()? {
            builder = builder.date_range(range);
        }
        for (index, series) in self.series_configs.iter().enumerate() {
            let id = series
                .id
                .clone()
                .unwrap_or_else(|| format!("series_{index}"));
            let label = series.label.clone().unwrap_or_else(|| series.measure.clone());
            let mut spec = SeriesSpec::new(id, label, series.measure.clone());
            if let Some(aggregation) = series.aggregation {
                spec = spec.with_aggregation(aggregation);
            }
            builder = builder.series(spec);
        }
        builder.build()
    }

    fn date_range(&self) -> PanoramaResult<Option<DateRange>> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => DateRange::new(start, end).map(Some),
            (None, None) => Ok(None),
            _ => Err(ValidationError::InvalidValue {
                field: "dateRange".to_string(),
                reason: "startDate and endDate must be given together".to_string(),
            }
            .into()),
        }
    }
}

/// Request to render one panel per value of `column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandBy {
    pub column: String,
    pub limit: Option<usize>,
}

/// One chart render request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    pub config: ChartConfig,
    pub expand_by: Option<ExpandBy>,
}

impl ChartRequest {
    pub fn new(config: ChartConfig) -> Self {
        Self {
            config,
            expand_by: None,
        }
    }

    pub fn expanded_by(mut self, column: impl Into<String>, limit: Option<usize>) -> Self {
        self.expand_by = Some(ExpandBy {
            column: column.into(),
            limit,
        });
        self
    }
}
