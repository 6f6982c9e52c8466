//! Severity-classified findings and their recommendations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::evidence::EvidenceRef;

/// Severity tier of a finding. The derived ordering ranks `P0` first,
/// which is also the global sort order for findings (most severe first).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    P0,
    P1,
    P2,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
        }
    }

    /// The more severe of two optional classifications.
    pub fn most_severe(a: Option<Severity>, b: Option<Severity>) -> Option<Severity> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One remediation step attached to a finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub action: String,
    pub verification_step: String,
    /// Supporting references, capped at 3.
    pub evidence: Vec<EvidenceRef>,
}

/// A severity-classified, evidence-backed observation about one endpoint,
/// span, or query. Produced fresh on every analysis run, never persisted
/// as mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable synthetic id, e.g. `endpoint:<sha1>` or `query:<fingerprint>`.
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub impact_summary: String,
    /// Rounded metric values backing the classification.
    pub metrics: BTreeMap<String, Value>,
    /// Metric name to a one-line description of how it was derived.
    pub aggregation_provenance: BTreeMap<String, String>,
    /// Supporting references, capped at 3, in discovery order.
    pub evidence: Vec<EvidenceRef>,
    /// Up to 3 remediation steps.
    pub recommendations: Vec<Recommendation>,
}
