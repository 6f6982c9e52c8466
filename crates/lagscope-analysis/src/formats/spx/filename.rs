//! SPX dump filename recognition.
//!
//! SPX writes paired dumps named
//! `spx-full-<timestamp>-<host>-<pid>-<runid>.json` and `.txt.gz`. The
//! filename carries the run identity and lets either half locate its
//! counterpart.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<prefix>spx-full-(?P<timestamp>\d{8}_\d{6})-(?P<host>.+)-(?P<pid>\d+)-(?P<runid>\d+))\.(?P<ext>json|txt\.gz)$",
    )
    .unwrap()
});

/// A recognized SPX dump filename and the sibling paths implied by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpxFilename {
    pub basename: String,
    pub prefix: String,
    /// `json` or `txt.gz`.
    pub extension: String,
    pub timestamp: String,
    pub host: String,
    pub pid: u64,
    pub run_id: u64,
    pub json_path: String,
    pub text_gz_path: String,
}

impl SpxFilename {
    /// Recognize an SPX dump path; `None` when the basename does not
    /// carry the dump signature.
    pub fn parse(path: &str) -> Option<Self> {
        let basename = Path::new(path).file_name()?.to_str()?;
        let captures = FILENAME_RE.captures(basename)?;

        let prefix = captures["prefix"].to_string();
        let directory = Path::new(path).parent().unwrap_or(Path::new(""));
        let json_path = directory.join(format!("{prefix}.json")).to_string_lossy().into_owned();
        let text_gz_path =
            directory.join(format!("{prefix}.txt.gz")).to_string_lossy().into_owned();

        Some(Self {
            basename: basename.to_string(),
            extension: captures["ext"].to_string(),
            timestamp: captures["timestamp"].to_string(),
            host: captures["host"].to_string(),
            pid: captures["pid"].parse().ok()?,
            run_id: captures["runid"].parse().ok()?,
            prefix,
            json_path,
            text_gz_path,
        })
    }

    /// Run identity plus pairing state, attached to validation results so
    /// parse notes and endpoint synthesis can reuse it.
    pub fn metadata(&self, has_json: bool, has_text_gz: bool) -> BTreeMap<String, Value> {
        let status = if has_json && has_text_gz { "paired" } else { "partial" };

        let mut missing: Vec<&str> = Vec::new();
        if !has_json {
            missing.push("json");
        }
        if !has_text_gz {
            missing.push("txt.gz");
        }

        let counterpart = if self.extension == "json" {
            &self.text_gz_path
        } else {
            &self.json_path
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "run".to_string(),
            json!({
                "prefix": self.prefix,
                "timestamp": self.timestamp,
                "host": self.host,
                "pid": self.pid,
                "runid": self.run_id,
            }),
        );
        metadata.insert(
            "pairing".to_string(),
            json!({
                "status": status,
                "has_json": has_json,
                "has_txt_gz": has_text_gz,
                "missing": missing,
                "counterpart_path": counterpart,
            }),
        );

        metadata
    }
}
