//! Chart query dispatch.
//!
//! [`QueryOrchestrator::execute`] is the entry point chart handlers call. It
//! branches on the spec's [`QueryPlan`]: a single fetch, or one concurrent
//! fetch per series whose rows are tagged and concatenated in series order.
//! A dimension predicate needs no branch of its own; it rides along in the
//! spec and [`DataSourceCache`] applies it in memory.

use crate::chart::{ChartConfig, ChartRequest};
use crate::expansion::DimensionExpansionEngine;
use crate::fanout::run_bounded;
use crate::outcome::{ChartResponse, QueryOutcome};
use panorama_core::{
    CanonicalQuerySpec, ColumnMetadataProvider, FetchError, PanoramaResult, QueryConfig,
    QueryPlan, RawRow, RawRowFetcher, RbacScope, SeriesSpec, SeriesTag, SubFetchFailure,
    ValidationError,
};
use panorama_storage::{CacheLayer, DataSourceCache, DimensionValueCache};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct QueryOrchestrator {
    rows: Arc<DataSourceCache>,
    dimensions: Arc<DimensionValueCache>,
    fetcher: Arc<dyn RawRowFetcher>,
    columns: Arc<dyn ColumnMetadataProvider>,
    config: QueryConfig,
}

impl QueryOrchestrator {
    pub fn new(
        layer: &CacheLayer,
        fetcher: Arc<dyn RawRowFetcher>,
        columns: Arc<dyn ColumnMetadataProvider>,
        config: QueryConfig,
    ) -> Self {
        Self {
            rows: Arc::clone(layer.rows()),
            dimensions: Arc::clone(layer.dimensions()),
            fetcher,
            columns,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub(crate) fn dimensions(&self) -> &DimensionValueCache {
        &self.dimensions
    }

    pub(crate) fn fetcher(&self) -> &dyn RawRowFetcher {
        self.fetcher.as_ref()
    }

    pub(crate) fn columns(&self) -> &dyn ColumnMetadataProvider {
        self.columns.as_ref()
    }

    pub fn expansion(&self) -> DimensionExpansionEngine {
        DimensionExpansionEngine::new(self.clone())
    }

    /// Normalize a chart configuration after checking its data source exists.
    pub async fn resolve_spec(&self, chart: &ChartConfig) -> PanoramaResult<CanonicalQuerySpec> {
        let spec = chart.to_spec()?;
        let data_source_id = spec.data_source_id();
        if self.columns.columns(data_source_id).await?.is_none() {
            return Err(ValidationError::UnknownDataSource { data_source_id }.into());
        }
        Ok(spec)
    }

    /// Resolve and run a chart request, expanding it if asked to.
    pub async fn execute_request(
        &self,
        request: &ChartRequest,
        rbac: &RbacScope,
    ) -> PanoramaResult<ChartResponse> {
        let spec = self.resolve_spec(&request.config).await?;
        match &request.expand_by {
            Some(expand) => self
                .expansion()
                .expand(&spec, &expand.column, rbac, expand.limit)
                .await
                .map(ChartResponse::Expanded),
            None => self.execute(&spec, rbac).await.map(ChartResponse::Rows),
        }
    }

    /// Rows for `spec` visible to `rbac`.
    ///
    /// Bounded by the request timeout; on expiry every in-flight sub-fetch is
    /// aborted.
    pub async fn execute(
        &self,
        spec: &CanonicalQuerySpec,
        rbac: &RbacScope,
    ) -> PanoramaResult<QueryOutcome> {
        with_timeout(&self.config, self.dispatch(spec, rbac)).await
    }

    async fn dispatch(
        &self,
        spec: &CanonicalQuerySpec,
        rbac: &RbacScope,
    ) -> PanoramaResult<QueryOutcome> {
        match spec.plan() {
            QueryPlan::Single => {
                let rows = self.rows.fetch(spec, rbac, self.fetcher.as_ref()).await?;
                Ok(QueryOutcome::complete(rows.into_value()))
            }
            QueryPlan::MultiSeries(series) => self.fan_out_series(spec, series, rbac).await,
        }
    }

    async fn fan_out_series(
        &self,
        spec: &CanonicalQuerySpec,
        series: &[SeriesSpec],
        rbac: &RbacScope,
    ) -> PanoramaResult<QueryOutcome> {
        let fanout_id = Uuid::now_v7();
        debug!(
            fanout_id = %fanout_id,
            data_source_id = %spec.data_source_id(),
            series = series.len(),
            "Dispatching multi-series fan-out"
        );

        let results = run_bounded(series.to_vec(), self.config.series_concurrency, |s| {
            fetch_series(self.clone(), spec.for_series(&s), rbac.clone(), s)
        })
        .await?;

        let mut outcome = QueryOutcome::default();
        for (s, result) in series.iter().zip(results) {
            match result {
                Ok(rows) => outcome.rows.extend(rows),
                Err(e) => {
                    warn!(
                        fanout_id = %fanout_id,
                        series_id = %s.id,
                        error = %e,
                        "Series fetch failed"
                    );
                    outcome.failures.push(SubFetchFailure::new(s.id.clone(), e));
                }
            }
        }

        if !series.is_empty() && outcome.failures.len() == series.len() {
            return Err(FetchError::AllSubFetchesFailed {
                failures: outcome.failures,
            }
            .into());
        }
        Ok(outcome)
    }
}

async fn fetch_series(
    orchestrator: QueryOrchestrator,
    spec: CanonicalQuerySpec,
    rbac: RbacScope,
    series: SeriesSpec,
) -> PanoramaResult<Vec<RawRow>> {
    let rows = orchestrator
        .rows
        .fetch(&spec, &rbac, orchestrator.fetcher.as_ref())
        .await?;
    let tag = SeriesTag {
        series_id: series.id,
        series_label: series.label,
    };
    Ok(rows
        .into_value()
        .into_iter()
        .map(|row| row.with_series(tag.clone()))
        .collect())
}

pub(crate) async fn with_timeout<T>(
    config: &QueryConfig,
    work: impl Future<Output = PanoramaResult<T>>,
) -> PanoramaResult<T> {
    let after = config.request_timeout;
    tokio::time::timeout(after, work)
        .await
        .map_err(|_| FetchError::TimedOut { after })?
}
