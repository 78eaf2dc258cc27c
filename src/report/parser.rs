//! Report plist parsing
//!
//! Normalizes AutoPkg's `--report-plist` output into built, downloaded and
//! failed items.

use crate::error::{RunnerError, RunnerResult};
use crate::report::receipts::ReceiptScanner;
use plist::Value;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Package summary keys, most specific first
pub const PKG_SUMMARY_KEYS: &[&str] = &["pkg_creator_summary_result", "pkg_copier_summary_result"];

/// Summary key written by URLDownloader
pub const DOWNLOAD_SUMMARY_KEY: &str = "url_downloader_summary_result";

/// One row of a processor's summary table
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SummaryRow(BTreeMap<String, Value>);

impl SummaryRow {
    /// Build a row from string fields
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v)))
                .collect(),
        )
    }

    /// Field value as text
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_string)
    }

    /// Whether the row has `key`
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// `pkg_path` field
    pub fn pkg_path(&self) -> Option<&str> {
        self.get("pkg_path")
    }

    /// `version` field
    pub fn version(&self) -> Option<&str> {
        self.get("version")
    }

    /// Download path: `download_path`, else the first text field
    pub fn download_path(&self) -> Option<&str> {
        self.get("download_path")
            .or_else(|| self.0.values().find_map(Value::as_string))
    }
}

/// One entry of the report's `failures` list
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FailureRow {
    /// Error message
    #[serde(default)]
    pub message: Option<String>,
    /// Python traceback text
    #[serde(default)]
    pub traceback: Option<String>,
    /// Recipe that failed
    #[serde(default)]
    pub recipe: Option<String>,
}

/// Classified result of one recipe run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    /// Package rows (plus any promoted download)
    pub built: Vec<SummaryRow>,
    /// Download rows
    pub downloaded: Vec<SummaryRow>,
    /// Reported failures
    pub failed: Vec<FailureRow>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReport {
    #[serde(default)]
    failures: Vec<FailureRow>,
    #[serde(default)]
    summary_results: BTreeMap<String, RawSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSummary {
    #[serde(default)]
    data_rows: Vec<SummaryRow>,
}

/// Parses report plists, falling back to receipts for unsummarized builds
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportParser {
    receipts: ReceiptScanner,
}

impl ReportParser {
    /// Create a parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the report at `path`
    pub async fn parse(&self, path: &Path) -> RunnerResult<RunOutcome> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RunnerError::io(format!("reading report {}", path.display()), e))?;
        let (mut outcome, needs_fringe) = parse_report(&bytes)?;
        if needs_fringe {
            self.promote_fringe_build(&mut outcome).await;
        }
        Ok(outcome)
    }

    /// Failures listed in the report at `path`; empty when it cannot be read
    pub async fn failures(&self, path: &Path) -> Vec<FailureRow> {
        let Ok(bytes) = tokio::fs::read(path).await else {
            return vec![];
        };
        match plist::from_bytes::<RawReport>(&bytes) {
            Ok(report) => report.failures,
            Err(e) => {
                debug!("No readable failures in {}: {}", path.display(), e);
                vec![]
            }
        }
    }

    /// Report a downloaded package as built when no package summary exists
    async fn promote_fringe_build(&self, outcome: &mut RunOutcome) {
        let Some(fringe) = outcome
            .downloaded
            .iter()
            .filter_map(SummaryRow::download_path)
            .find(|path| looks_like_package(path))
            .map(str::to_string)
        else {
            return;
        };

        let info = self.receipts.scan(Path::new(&fringe)).await;
        let row = match (info.pkg_path, info.version) {
            (Some(pkg_path), Some(version)) => {
                SummaryRow::from_pairs([("pkg_path", pkg_path), ("version", version)])
            }
            (None, Some(version)) => {
                debug!("Appending built items with version");
                SummaryRow::from_pairs([("pkg_path", fringe), ("version", version)])
            }
            _ => SummaryRow::from_pairs([("pkg_path", fringe)]),
        };
        outcome.built.push(row);
    }
}

/// Parse report bytes; the flag says whether fringe-build promotion applies
fn parse_report(bytes: &[u8]) -> RunnerResult<(RunOutcome, bool)> {
    let report: RawReport = plist::from_bytes(bytes)?;
    let mut outcome = RunOutcome {
        failed: report.failures,
        ..Default::default()
    };

    if report.summary_results.is_empty() {
        return Ok((outcome, false));
    }

    let pkg_key = pkg_summary_key(&report.summary_results);
    if let Some(key) = pkg_key {
        debug!("Using package summary {}", key);
        outcome.built = report.summary_results[key].data_rows.clone();
    }
    if let Some(downloads) = report.summary_results.get(DOWNLOAD_SUMMARY_KEY) {
        outcome.downloaded = downloads.data_rows.clone();
    }

    let needs_fringe = pkg_key.is_none() && !outcome.downloaded.is_empty();
    Ok((outcome, needs_fringe))
}

/// Known package summary keys in priority order, then any key containing "pkg"
fn pkg_summary_key<V>(summaries: &BTreeMap<String, V>) -> Option<&str> {
    PKG_SUMMARY_KEYS
        .iter()
        .copied()
        .find(|key| summaries.contains_key(*key))
        .or_else(|| {
            summaries
                .keys()
                .map(String::as_str)
                .find(|key| key.contains("pkg"))
        })
}

fn looks_like_package(path: &str) -> bool {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase().contains("pkg"))
        .unwrap_or(false)
}
