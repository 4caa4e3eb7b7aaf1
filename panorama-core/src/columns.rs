//! Column metadata and the collaborator traits the cache layer consumes.

use crate::error::PanoramaResult;
use crate::identity::DataSourceId;
use crate::row::RawRow;
use crate::spec::CanonicalQuerySpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-column flags configured on a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Column may appear in advanced filters.
    pub is_filterable: bool,
    /// Column may be used to expand a chart into one panel per value.
    pub is_expansion_dimension: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_filterable: false,
            is_expansion_dimension: false,
        }
    }

    pub fn filterable(mut self) -> Self {
        self.is_filterable = true;
        self
    }

    pub fn expansion_dimension(mut self) -> Self {
        self.is_expansion_dimension = true;
        self
    }
}

/// The column configuration of one data source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataSourceColumns {
    columns: Vec<ColumnMetadata>,
}

impl DataSourceColumns {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_filterable(&self, name: &str) -> bool {
        self.get(name).is_some_and(|c| c.is_filterable)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter()
    }
}

/// Supplies column flags for data sources.
#[async_trait]
pub trait ColumnMetadataProvider: Send + Sync {
    /// Column configuration of a data source, or `None` if it does not exist.
    async fn columns(&self, data_source_id: DataSourceId) -> PanoramaResult<Option<DataSourceColumns>>;
}

/// Occurrence count of one dimension value within one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionValueCount {
    pub value: Value,
    pub organization_id: String,
    pub rows: u64,
}

/// Executes aggregation queries against the underlying store.
///
/// Implementations enforce no access control: they return organization-agnostic
/// rows which the cache filters per caller. Pushing date ranges and advanced
/// filters down to the store is allowed.
#[async_trait]
pub trait RawRowFetcher: Send + Sync {
    /// Rows for a spec. The spec never carries a dimension predicate.
    async fn fetch_rows(&self, spec: &CanonicalQuerySpec) -> PanoramaResult<Vec<RawRow>>;

    /// Distinct values of `column`, counted per organization identifier found
    /// in `organization_column`.
    async fn fetch_dimension_values(
        &self,
        data_source_id: DataSourceId,
        column: &str,
        organization_column: &str,
    ) -> PanoramaResult<Vec<DimensionValueCount>>;
}
