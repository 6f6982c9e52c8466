//! Aggregated slow-query observations.

use serde::{Deserialize, Serialize};

use super::evidence::EvidenceRef;

/// One distinct SQL shape after merging, keyed by fingerprint.
///
/// `avg_time_ms` is always `total_time_ms / count` (0 when count is 0).
/// `lock_ms` and `rows_examined` stay `None` only when no contributing
/// record ever reported them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbQuerySample {
    /// SHA-256 of the normalized (literal-redacted, lower-cased) SQL.
    pub fingerprint: String,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub count: u64,
    pub lock_ms: Option<f64>,
    pub rows_examined: Option<f64>,
    /// Redacted example statements, capped at 3.
    pub examples: Vec<String>,
    pub evidence: Vec<EvidenceRef>,
}
