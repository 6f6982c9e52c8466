//! Shared constants for the lagscope diagnostics engine.

/// Lagscope version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ceiling on decompressed bytes for gzip text profiles (default: 16 MiB).
pub const DEFAULT_MAX_TEXT_GZ_BYTES: u64 = 16_777_216;

/// Maximum lines scanned when probing a slow log for its required markers.
pub const SLOW_LOG_MARKER_SCAN_LINES: usize = 500;

/// Redacted SQL examples retained per query fingerprint.
pub const MAX_EXAMPLES_PER_FINGERPRINT: usize = 3;

/// Evidence references retained per finding or recommendation.
pub const MAX_EVIDENCE_REFS: usize = 3;

/// Recommendations retained per finding.
pub const MAX_RECOMMENDATIONS: usize = 3;

/// Default number of ranked rows per analysis category.
pub const DEFAULT_TOP_N: usize = 5;

/// Lower clamp bound for the ranked-row count.
pub const MIN_TOP_N: usize = 1;

/// Upper clamp bound for the ranked-row count.
pub const MAX_TOP_N: usize = 20;
