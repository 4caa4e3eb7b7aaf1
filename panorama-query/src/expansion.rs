//! Dimension expansion: one chart replayed once per value of a column.
//!
//! Every group's spec is the base spec plus one equality predicate, built
//! with [`CanonicalQuerySpec::with_dimension_filter`]. Series, date range and
//! existing filters carry over untouched.

use crate::fanout::run_bounded;
use crate::orchestrator::{with_timeout, QueryOrchestrator};
use crate::outcome::{DimensionExpansion, DimensionGroup};
use panorama_core::{
    scalar_key, CanonicalQuerySpec, DataSourceId, DimensionFilter, FetchError, PanoramaError,
    PanoramaResult, RbacScope, SubFetchFailure, ValidationError,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct DimensionExpansionEngine {
    orchestrator: QueryOrchestrator,
}

impl DimensionExpansionEngine {
    pub fn new(orchestrator: QueryOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Expand `base` by `column`.
    ///
    /// `limit` defaults to the configured expansion limit and is clamped to
    /// `[1, expansion_max_limit]`.
    ///
    /// # Errors
    /// - `PermissionDenied` for an empty scope.
    /// - `UnknownColumn`, `DimensionNotExpandable` or `DimensionNotFilterable`
    ///   if the column's metadata does not allow expansion.
    /// - `AllSubFetchesFailed` if every group failed.
    pub async fn expand(
        &self,
        base: &CanonicalQuerySpec,
        column: &str,
        rbac: &RbacScope,
        limit: Option<usize>,
    ) -> PanoramaResult<DimensionExpansion> {
        with_timeout(
            self.orchestrator.config(),
            self.expand_inner(base, column, rbac, limit),
        )
        .await
    }

    async fn expand_inner(
        &self,
        base: &CanonicalQuerySpec,
        column: &str,
        rbac: &RbacScope,
        limit: Option<usize>,
    ) -> PanoramaResult<DimensionExpansion> {
        if !rbac.is_resolvable() {
            return Err(PanoramaError::permission_denied(
                "RBAC scope grants no organizations",
            ));
        }
        let data_source_id = base.data_source_id();
        self.check_dimension(data_source_id, column).await?;

        let config = self.orchestrator.config();
        let limit = config.effective_expansion_limit(limit);
        let value_set = self
            .orchestrator
            .dimensions()
            .values(data_source_id, column, rbac, limit, self.orchestrator.fetcher())
            .await?
            .into_value();

        let fanout_id = Uuid::now_v7();
        info!(
            fanout_id = %fanout_id,
            data_source_id = %data_source_id,
            column,
            values = value_set.values.len(),
            total_distinct = value_set.total_distinct,
            "Expanding chart by dimension"
        );

        let specs: Vec<CanonicalQuerySpec> = value_set
            .values
            .iter()
            .map(|value| base.with_dimension_filter(DimensionFilter::new(column, value.clone())))
            .collect();

        let results = run_bounded(specs.clone(), config.expansion_concurrency, |spec| {
            let orchestrator = self.orchestrator.clone();
            let rbac = rbac.clone();
            async move { orchestrator.execute(&spec, &rbac).await }
        })
        .await?;

        let mut groups = Vec::with_capacity(specs.len());
        let mut failures = Vec::new();
        for ((value, spec), result) in value_set.values.iter().zip(specs).zip(results) {
            if let Err(e) = &result {
                let item = scalar_key(value).unwrap_or_else(|| value.to_string());
                warn!(
                    fanout_id = %fanout_id,
                    column,
                    value = %item,
                    error = %e,
                    "Dimension value fetch failed"
                );
                failures.push(SubFetchFailure::new(item, e.clone()));
            }
            groups.push(DimensionGroup {
                value: value.clone(),
                spec,
                result,
            });
        }

        if !groups.is_empty() && failures.len() == groups.len() {
            return Err(FetchError::AllSubFetchesFailed { failures }.into());
        }

        Ok(DimensionExpansion {
            column: column.to_string(),
            groups,
            total_distinct: value_set.total_distinct,
            truncated: value_set.is_truncated(),
        })
    }

    async fn check_dimension(
        &self,
        data_source_id: DataSourceId,
        column: &str,
    ) -> PanoramaResult<()> {
        let columns = self
            .orchestrator
            .columns()
            .columns(data_source_id)
            .await?
            .ok_or(ValidationError::UnknownDataSource { data_source_id })?;
        let metadata = columns
            .get(column)
            .ok_or_else(|| ValidationError::UnknownColumn {
                data_source_id,
                column: column.to_string(),
            })?;

        if !metadata.is_expansion_dimension {
            return Err(ValidationError::DimensionNotExpandable {
                data_source_id,
                column: column.to_string(),
            }
            .into());
        }
        if !metadata.is_filterable {
            return Err(ValidationError::DimensionNotFilterable {
                data_source_id,
                column: column.to_string(),
            }
            .into());
        }
        Ok(())
    }
}
