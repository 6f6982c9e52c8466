//! Request profiles and call-tree spans.

use serde::{Deserialize, Serialize};

use super::evidence::EvidenceRef;

/// One call-tree node from a profiler capture.
///
/// `self_ms <= total_ms` is expected but not enforced; profiler output may
/// violate it and downstream ranking tolerates that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(rename = "type")]
    pub span_type: String,
    pub label: String,
    pub self_ms: f64,
    pub total_ms: f64,
    pub evidence: Vec<EvidenceRef>,
}

/// One observed request execution (or one profiler run when the capture
/// carries no explicit endpoint, in which case `endpoint` is synthetic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestProfile {
    /// Logical route/URL key.
    pub endpoint: String,
    pub ttfb_ms: Option<f64>,
    pub wall_ms: f64,
    pub cpu_ms: Option<f64>,
    pub mem_mb: Option<f64>,
    pub spans: Vec<Span>,
    pub evidence: Vec<EvidenceRef>,
}
