//! Post-run download metadata capture
//!
//! After a recipe runs, the primary download and any other sizeable files
//! sharing its `downloads` directory are folded back into the cache so the
//! next run can replicate them.

use crate::attrs::{self, AttributeStore};
use crate::cache::store::{CacheEntry, CacheStore, DownloadRecord, MetadataCache};
use crate::cache::replicate::localize_path;
use crate::error::{RunnerError, RunnerResult};
use crate::host::SystemInfo;
use crate::report::RunOutcome;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Files at or below this size are treated as temporary or partial
pub const BONUS_MIN_BYTES: u64 = 500_000;

const DOWNLOADS_DIR: &str = "downloads";

/// What a run knows about its tracked download
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryDownload {
    /// Download URL
    pub url: Option<String>,
    /// Path of the downloaded file
    pub pathname: PathBuf,
    /// HTTP etag
    pub etag: Option<String>,
    /// HTTP Last-Modified
    pub last_modified: Option<String>,
}

impl PrimaryDownload {
    /// Work out the tracked download for a finished run
    ///
    /// The path is the first download in the report, else the previously
    /// cached primary path rewritten for the current console user. Provenance
    /// comes from the file's attributes; the URL falls back to the cached one
    /// when the path is unchanged.
    pub async fn discover(
        outcome: &RunOutcome,
        cached: Option<&CacheEntry>,
        console_user: Option<&str>,
        attrs: &dyn AttributeStore,
    ) -> Option<Self> {
        let previous = cached.and_then(CacheEntry::primary);
        let pathname = outcome
            .downloaded
            .iter()
            .find_map(|row| row.download_path())
            .map(str::to_string)
            .or_else(|| {
                previous
                    .and_then(|record| record.pathname.as_deref())
                    .map(|path| localize_path(path, console_user))
            })?;
        let pathname = PathBuf::from(pathname);

        let url = match attrs::read_source_url(attrs, &pathname).await {
            Some(url) => Some(url),
            None => previous
                .filter(|record| {
                    record
                        .pathname
                        .as_deref()
                        .is_some_and(|p| localize_path(p, console_user) == pathname.to_string_lossy())
                })
                .and_then(|record| record.url.clone()),
        };

        Some(Self {
            url,
            etag: attrs::read_text(attrs, &pathname, attrs::ETAG).await,
            last_modified: attrs::read_text(attrs, &pathname, attrs::LAST_MODIFIED).await,
            pathname,
        })
    }
}

/// Walk upward from `path` to the nearest directory named `downloads`
pub fn find_downloads_dir(path: &Path) -> Option<&Path> {
    path.ancestors()
        .skip(1)
        .find(|dir| dir.file_name().is_some_and(|name| name == DOWNLOADS_DIR))
}

/// Records a run's downloads into the metadata cache
pub struct MetadataRecorder<'a> {
    store: &'a CacheStore,
    attrs: &'a dyn AttributeStore,
    system: &'a dyn SystemInfo,
}

impl<'a> MetadataRecorder<'a> {
    /// Create a recorder writing through `store`
    pub fn new(
        store: &'a CacheStore,
        attrs: &'a dyn AttributeStore,
        system: &'a dyn SystemInfo,
    ) -> Self {
        Self {
            store,
            attrs,
            system,
        }
    }

    /// Record `primary` plus bonus downloads under `recipe_file`
    ///
    /// Updates `cache` in memory and merges the single key into the file on
    /// disk. Returns whether the entry was stamped as modified.
    pub async fn record(
        &self,
        cache: &mut MetadataCache,
        recipe_file: &str,
        primary: &PrimaryDownload,
    ) -> RunnerResult<bool> {
        let (first, mut modified) = self.primary_record(primary).await?;
        let mut records = vec![first];

        if let Some(downloads) = find_downloads_dir(&primary.pathname) {
            let bonus = self.bonus_downloads(downloads, &primary.pathname).await?;
            if !bonus.is_empty() {
                modified = true;
                records.extend(bonus);
            }
        } else {
            debug!(
                "No downloads directory above {}; skipping bonus scan",
                primary.pathname.display()
            );
        }

        let entry = cache.entry(recipe_file.to_string()).or_insert_with(CacheEntry::default);
        if modified {
            entry.cache_timestamp = Some(Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string());
        }
        entry.download_metadata = records;

        self.store.merge_entry(recipe_file, entry).await?;
        Ok(modified)
    }

    async fn primary_record(&self, primary: &PrimaryDownload) -> RunnerResult<(DownloadRecord, bool)> {
        let size = fs::metadata(&primary.pathname)
            .await
            .map_err(|e| {
                RunnerError::io(format!("reading size of {}", primary.pathname.display()), e)
            })?
            .len();

        let mut modified = false;
        let mut record = DownloadRecord {
            pathname: Some(primary.pathname.to_string_lossy().into_owned()),
            ..Default::default()
        };

        if let Some(ref url) = primary.url {
            info!("URL: {}", url);
            record.url = Some(url.clone());
        }
        info!("Path: {}", primary.pathname.display());
        if let Some(ref etag) = primary.etag {
            info!("etag: {}", etag);
            record.etag = Some(etag.clone());
            modified = true;
        }
        if let Some(ref last_modified) = primary.last_modified {
            info!("last_modified: {}", last_modified);
            record.last_modified = Some(last_modified.clone());
            modified = true;
        }
        if size > 0 {
            info!("DL size: {}", size);
            record.dl_size_in_bytes = Some(size.to_string());
            modified = true;
        }

        Ok((record, modified))
    }

    /// Scan `downloads` for other valid downloads besides `known`
    pub async fn bonus_downloads(
        &self,
        downloads: &Path,
        known: &Path,
    ) -> RunnerResult<Vec<DownloadRecord>> {
        let mut listing = fs::read_dir(downloads).await.map_err(|e| {
            RunnerError::io(format!("listing {}", downloads.display()), e)
        })?;
        let mut entries = 0;
        while listing
            .next_entry()
            .await
            .map_err(|e| RunnerError::io(format!("listing {}", downloads.display()), e))?
            .is_some()
        {
            entries += 1;
        }
        if entries <= 1 {
            return Ok(vec![]);
        }

        let mut candidates: Vec<(PathBuf, u64)> = WalkDir::new(downloads)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let size = e.metadata().ok()?.len();
                Some((e.into_path(), size))
            })
            .filter(|(path, size)| *size > BONUS_MIN_BYTES && path != known)
            .collect();
        candidates.sort();

        let mut records = Vec::new();
        for (path, size) in candidates {
            debug!("{} appears to be valid with byte size {}", path.display(), size);
            if let Some(record) = self.bonus_record(&path, size).await {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn bonus_record(&self, path: &Path, size: u64) -> Option<DownloadRecord> {
        let etag = attrs::read_text(self.attrs, path, attrs::ETAG).await;
        let last_modified = attrs::read_text(self.attrs, path, attrs::LAST_MODIFIED).await;
        let url = attrs::read_source_url(self.attrs, path).await;

        let accepted = last_modified.is_some()
            || self
                .system
                .content_type(path)
                .await
                .is_some_and(|kind| kind.contains("archive") || kind.contains("compressed"));
        if !accepted {
            debug!("Ignoring {}; no provenance and not an archive", path.display());
            return None;
        }

        if let Some(ref url) = url {
            info!("Bonus URL: {}", url);
        }
        info!("Bonus path: {}", path.display());
        if let Some(ref etag) = etag {
            info!("Bonus etag: {}", etag);
        }
        if let Some(ref modified) = last_modified {
            info!("Bonus last_modified: {}", modified);
        }
        info!("Bonus DL size: {}", size);

        Some(DownloadRecord {
            pathname: Some(path.to_string_lossy().into_owned()),
            url,
            etag,
            last_modified,
            dl_size_in_bytes: Some(size.to_string()),
        })
    }
}
