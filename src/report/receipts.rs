//! Receipt fallback for package path and version
//!
//! Some processors build a package without adding a summary row. AutoPkg
//! still writes a receipt plist for each run into `<cache>/receipts`; a
//! receipt newer than the download most likely belongs to the run that
//! produced it.

use plist::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::debug;

const RECEIPTS_DIR: &str = "receipts";
const VERSION_KEY: &str = "version";
const PKG_PATH_KEY: &str = "pkg_path";

/// Values recovered from receipts; either may be unresolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptInfo {
    /// Built package path
    pub pkg_path: Option<String>,
    /// Built version
    pub version: Option<String>,
}

/// Scans receipts written after a given download
#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiptScanner;

impl ReceiptScanner {
    /// Create a scanner
    pub fn new() -> Self {
        Self
    }

    /// Best `(pkg_path, version)` from receipts newer than `download`
    pub async fn scan(&self, download: &Path) -> ReceiptInfo {
        let mut info = ReceiptInfo::default();
        debug!("Trying to get receipt data from provided DL {}", download.display());

        let Some(dl_modified) = modified(download).await else {
            debug!("Unable to read modification time of {}", download.display());
            return info;
        };
        let Some(receipts) = download.ancestors().nth(2).map(|root| root.join(RECEIPTS_DIR)) else {
            return info;
        };
        if !receipts.is_dir() {
            debug!("No receipts directory at {}", receipts.display());
            return info;
        }

        for receipt in newer_receipts(&receipts, dl_modified).await {
            debug!("Found new receipt at {}", receipt.display());
            let bytes = match fs::read(&receipt).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Unable to read {}: {}", receipt.display(), e);
                    continue;
                }
            };
            let value = match Value::from_reader(std::io::Cursor::new(bytes)) {
                Ok(value) => value,
                Err(e) => {
                    debug!("Unable to parse {}: {}", receipt.display(), e);
                    continue;
                }
            };

            if let Some(version) = last_nested(&value, VERSION_KEY) {
                debug!("Found {}", version);
                info.version = Some(version);
            }
            if let Some(pkg_path) = last_nested(&value, PKG_PATH_KEY) {
                info.pkg_path = Some(pkg_path);
            }
        }

        info
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).await.ok()?.modified().ok()
}

/// Receipts strictly newer than `after`, oldest first
async fn newer_receipts(dir: &Path, after: SystemTime) -> Vec<PathBuf> {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return Vec::new();
    };
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if let Some(time) = modified(&path).await {
            if time > after && path.is_file() {
                found.push((time, path));
            }
        }
    }
    found.sort();
    found.into_iter().map(|(_, path)| path).collect()
}

/// Last value of `key` found in any dictionary nested one level inside the receipt's records
fn last_nested(receipt: &Value, key: &str) -> Option<String> {
    receipt
        .as_array()?
        .iter()
        .filter_map(Value::as_dictionary)
        .flat_map(|record| record.values())
        .filter_map(Value::as_dictionary)
        .filter_map(|values| values.get(key))
        .filter_map(scalar_text)
        .last()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        _ => None,
    }
}
