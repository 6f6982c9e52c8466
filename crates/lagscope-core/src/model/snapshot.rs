//! The canonical, content-addressed snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::artifact::SourceArtifact;
use super::profile::RequestProfile;
use super::query::DbQuerySample;

/// Lower-hex SHA-256 digest identifying a snapshot by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SnapshotId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Aggregate of all request-profile and query data from one ingestion
/// batch. Immutable; the id is a pure function of the three collections,
/// so identical logical inputs yield an identical id regardless of input
/// order. `collected_at` records construction time and is not part of the
/// id derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    /// RFC 3339 UTC timestamp of snapshot construction.
    pub collected_at: String,
    pub sources: Vec<SourceArtifact>,
    pub request_profiles: Vec<RequestProfile>,
    pub db_query_samples: Vec<DbQuerySample>,
}
