//! Snapshot analysis: thresholds, the ranking engine, and the run service.

pub mod analyzer;
pub mod run;
pub mod thresholds;

pub use analyzer::{
    Aggregates, AnalysisOutcome, EndpointAggregate, QueryAggregate, SnapshotAnalysisEngine,
    SpanAggregate,
};
pub use run::{
    AnalysisReport, AnalysisRunParams, AnalysisRunService, FindingsBySeverity, RunSummary,
};
pub use thresholds::{AnalysisThresholds, ThresholdBand, ThresholdTableEntry};
