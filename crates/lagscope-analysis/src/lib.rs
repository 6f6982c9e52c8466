//! Artifact ingestion and snapshot analysis for lagscope.
//!
//! Raw artifact descriptors flow through format validation into per-format
//! parsers, the snapshot builder merges the parsed fragments into one
//! content-addressed [`lagscope_core::model::Snapshot`], and the analysis
//! engine ranks endpoints, spans, and queries into severity-tiered
//! findings.

pub mod engine;
pub mod fingerprint;
pub mod formats;
pub mod ingest;
pub mod store;
pub mod validate;

pub use engine::{
    AnalysisOutcome, AnalysisReport, AnalysisRunParams, AnalysisRunService, AnalysisThresholds,
    SnapshotAnalysisEngine,
};
pub use fingerprint::SqlFingerprint;
pub use ingest::{ArtifactIngestor, IngestOutcome};
pub use store::{MemorySnapshotStore, SnapshotStore};
pub use validate::ArtifactValidator;
