//! Severity cut points for ranking, with strict override validation.
//!
//! Five fixed metrics each carry a `p0 >= p1 >= p2` band. Callers may
//! override complete bands; a supplied override is validated strictly and
//! every violation is collected before the constructor fails, so a caller
//! sees all problems at once. Metrics left at their defaults are flagged
//! with an open-question note recommending explicit configuration.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Serialize;
use serde_json::{Map, Value};

use lagscope_core::errors::AnalysisError;
use lagscope_core::model::Severity;

const SOURCE_CONFIGURED: &str = "configured";
const SOURCE_DEFAULT: &str = "default_conservative";

/// One metric's cut points, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdBand {
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
}

static CONSERVATIVE_DEFAULTS: LazyLock<BTreeMap<&'static str, ThresholdBand>> =
    LazyLock::new(|| {
        BTreeMap::from([
            ("endpoint_wall_ms", ThresholdBand { p0: 2000.0, p1: 1000.0, p2: 400.0 }),
            ("endpoint_ttfb_ms", ThresholdBand { p0: 1500.0, p1: 800.0, p2: 300.0 }),
            ("span_self_ms", ThresholdBand { p0: 800.0, p1: 300.0, p2: 100.0 }),
            ("span_total_ms", ThresholdBand { p0: 1500.0, p1: 700.0, p2: 250.0 }),
            ("query_total_time_ms", ThresholdBand { p0: 10000.0, p1: 3000.0, p2: 1000.0 }),
        ])
    });

/// Row of the reporting table returned by [`AnalysisThresholds::table`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdTableEntry {
    pub p0: f64,
    pub p1: f64,
    pub p2: f64,
    pub source: String,
}

/// Resolved severity bands for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisThresholds {
    bands: BTreeMap<String, ThresholdBand>,
    sources: BTreeMap<String, &'static str>,
    open_questions: Vec<String>,
}

impl AnalysisThresholds {
    /// All-default bands, with one open-question note per metric.
    pub fn conservative() -> Self {
        let mut bands = BTreeMap::new();
        let mut sources = BTreeMap::new();
        let mut open_questions = Vec::new();

        for (metric, band) in CONSERVATIVE_DEFAULTS.iter() {
            bands.insert((*metric).to_string(), *band);
            sources.insert((*metric).to_string(), SOURCE_DEFAULT);
            open_questions.push(default_note(metric));
        }
        open_questions.sort();

        Self { bands, sources, open_questions }
    }

    /// Builds bands from an optional override object.
    ///
    /// `None` yields the conservative defaults. A supplied value must be a
    /// JSON object mapping known metric names to `{p0, p1, p2}` objects of
    /// positive integers with `p0 >= p1 >= p2`; unknown metrics, unknown
    /// keys, and malformed or out-of-order values are hard errors, all
    /// collected into one sorted, deduplicated list. Metrics absent from a
    /// valid override keep their defaults and emit the open-question note.
    pub fn from_input(input: Option<&Value>) -> Result<Self, AnalysisError> {
        let Some(value) = input else {
            return Ok(Self::conservative());
        };

        let Some(supplied) = value.as_object() else {
            return Err(AnalysisError::InvalidThresholds {
                errors: vec!["thresholds input must be an object".to_string()],
            });
        };

        let mut errors: Vec<String> = Vec::new();
        let mut bands = BTreeMap::new();
        let mut sources = BTreeMap::new();
        let mut open_questions = Vec::new();

        for key in supplied.keys() {
            if !CONSERVATIVE_DEFAULTS.contains_key(key.as_str()) {
                errors.push(format!("unknown threshold metric \"{key}\""));
            }
        }

        for (metric, default_band) in CONSERVATIVE_DEFAULTS.iter() {
            match supplied.get(*metric) {
                None => {
                    bands.insert((*metric).to_string(), *default_band);
                    sources.insert((*metric).to_string(), SOURCE_DEFAULT);
                    open_questions.push(default_note(metric));
                }
                Some(candidate) => {
                    if let Some(band) = parse_band(metric, candidate, &mut errors) {
                        bands.insert((*metric).to_string(), band);
                        sources.insert((*metric).to_string(), SOURCE_CONFIGURED);
                    }
                }
            }
        }

        if !errors.is_empty() {
            errors.sort();
            errors.dedup();
            return Err(AnalysisError::InvalidThresholds { errors });
        }

        open_questions.sort();
        open_questions.dedup();

        Ok(Self { bands, sources, open_questions })
    }

    /// The highest tier whose cut point `value` meets or exceeds, or `None`
    /// below every cut point (or for an unknown metric).
    pub fn severity_for(&self, metric: &str, value: f64) -> Option<Severity> {
        let band = self.bands.get(metric)?;
        if value >= band.p0 {
            return Some(Severity::P0);
        }
        if value >= band.p1 {
            return Some(Severity::P1);
        }
        if value >= band.p2 {
            return Some(Severity::P2);
        }
        None
    }

    /// Per-metric cut points and their provenance, sorted by metric name.
    pub fn table(&self) -> BTreeMap<String, ThresholdTableEntry> {
        self.bands
            .iter()
            .map(|(metric, band)| {
                (
                    metric.clone(),
                    ThresholdTableEntry {
                        p0: band.p0,
                        p1: band.p1,
                        p2: band.p2,
                        source: self
                            .sources
                            .get(metric)
                            .copied()
                            .unwrap_or(SOURCE_DEFAULT)
                            .to_string(),
                    },
                )
            })
            .collect()
    }

    pub fn open_questions(&self) -> &[String] {
        &self.open_questions
    }
}

fn default_note(metric: &str) -> String {
    format!(
        "OPEN_QUESTION: provide custom thresholds for \"{metric}\" to replace conservative defaults."
    )
}

fn parse_band(metric: &str, value: &Value, errors: &mut Vec<String>) -> Option<ThresholdBand> {
    let Some(candidate) = value.as_object() else {
        errors.push(format!(
            "threshold set for \"{metric}\" must be an object with keys p0, p1, p2"
        ));
        return None;
    };

    let before = errors.len();
    for key in candidate.keys() {
        if !matches!(key.as_str(), "p0" | "p1" | "p2") {
            errors.push(format!(
                "unknown threshold key \"{key}\" for metric \"{metric}\""
            ));
        }
    }

    let p0 = cut_point(metric, "p0", candidate, errors);
    let p1 = cut_point(metric, "p1", candidate, errors);
    let p2 = cut_point(metric, "p2", candidate, errors);

    let (Some(p0), Some(p1), Some(p2)) = (p0, p1, p2) else {
        return None;
    };
    if errors.len() > before {
        return None;
    }

    if !(p0 >= p1 && p1 >= p2) {
        errors.push(format!(
            "threshold set for \"{metric}\" must satisfy p0 >= p1 >= p2"
        ));
        return None;
    }

    Some(ThresholdBand { p0, p1, p2 })
}

fn cut_point(
    metric: &str,
    key: &str,
    candidate: &Map<String, Value>,
    errors: &mut Vec<String>,
) -> Option<f64> {
    let Some(value) = candidate.get(key) else {
        errors.push(format!(
            "threshold set for \"{metric}\" is missing key \"{key}\""
        ));
        return None;
    };

    match value.as_u64() {
        Some(cut) if cut > 0 => Some(cut as f64),
        _ => {
            errors.push(format!(
                "threshold \"{metric}.{key}\" must be a positive integer"
            ));
            None
        }
    }
}
