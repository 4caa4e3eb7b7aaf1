//! Panorama Query - Chart Query Orchestration
//!
//! Turns chart configurations into canonical specs and executes them through
//! the cache layer:
//!
//! - [`QueryOrchestrator`]: single fetch or concurrent multi-series fan-out,
//!   with partial results when some series fail
//! - [`DimensionExpansionEngine`]: one result group per distinct value of an
//!   expansion dimension
//! - [`ChartConfig`] / [`ChartRequest`]: the loosely-typed input handlers
//!   receive from the chart editor

pub mod chart;
pub mod expansion;
mod fanout;
pub mod orchestrator;
pub mod outcome;

pub use chart::{ChartConfig, ChartRequest, ExpandBy, SeriesConfig};
pub use expansion::DimensionExpansionEngine;
pub use orchestrator::QueryOrchestrator;
pub use outcome::{
    ChartResponse, DimensionExpansion, DimensionGroup, PartialFetchFailure, QueryOutcome,
};
