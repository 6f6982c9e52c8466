//! SQL statement redaction and fingerprinting.
//!
//! Slow-log entries carry raw statements with customer values baked in.
//! Redaction strips those values so statements can be grouped by shape,
//! and the fingerprint is a stable hash of the lowercased redacted form.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Single-quoted string literals, `''` treated as an escaped quote.
static SINGLE_QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'(?:''|[^'])*'").unwrap());

/// Double-quoted literals, `""` treated as an escaped quote.
static DOUBLE_QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:""|[^"])*""#).unwrap());

/// Bare numeric literals, integer or decimal.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap());

/// Runs of whitespace, including newlines inside multi-line statements.
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Normalizes SQL text into a privacy-safe shape and a stable identity.
pub struct SqlFingerprint;

impl SqlFingerprint {
    /// Replace literal values with `?` placeholders and collapse whitespace.
    ///
    /// Keyword case is preserved so redacted examples stay readable.
    pub fn redact(sql: &str) -> String {
        let redacted = SINGLE_QUOTED_RE.replace_all(sql, "'?'");
        let redacted = DOUBLE_QUOTED_RE.replace_all(&redacted, "\"?\"");
        let redacted = NUMBER_RE.replace_all(&redacted, "?");
        let redacted = WHITESPACE_RE.replace_all(&redacted, " ");
        redacted.trim().to_string()
    }

    /// Hash of the lowercased redacted statement.
    ///
    /// Statements that differ only in literal values or letter case map to
    /// the same fingerprint.
    pub fn fingerprint(sql: &str) -> String {
        let normalized = Self::redact(sql).to_lowercase();
        let normalized = WHITESPACE_RE.replace_all(&normalized, " ");
        format!("{:x}", Sha256::digest(normalized.trim().as_bytes()))
    }
}
