//! Domain value objects shared by ingestion and analysis.
//!
//! Everything here is constructed once and passed by value or shared
//! reference; only transient accumulators mutate during merging/ranking.

pub mod artifact;
pub mod evidence;
pub mod finding;
pub mod profile;
pub mod query;
pub mod snapshot;

pub use artifact::{ArtifactDescriptor, SourceArtifact, ValidationResult};
pub use evidence::{EvidenceRef, LineRange};
pub use finding::{Finding, Recommendation, Severity};
pub use profile::{RequestProfile, Span};
pub use query::DbQuerySample;
pub use snapshot::{Snapshot, SnapshotId};
