//! Placeholder replication
//!
//! Before a run, every cached download is recreated on disk as a sparse
//! file of the recorded size carrying the recorded etag/last-modified
//! attributes. AutoPkg then compares those against the server and skips
//! downloads that have not changed.

use crate::attrs::{self, AttributeStore};
use crate::cache::store::{DownloadRecord, MetadataCache};
use crate::error::{RunnerError, RunnerResult};
use crate::host::SystemInfo;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};

const USERS_PREFIX: &str = "/Users/";
const LIBRARY_SEGMENT: &str = "/Library";

/// Outcome counts for one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationSummary {
    /// Placeholders written
    pub written: usize,
    /// Records skipped (missing pathname or malformed)
    pub skipped: usize,
}

/// Short home directory name between `/Users/` and the next `/Library`
pub fn home_short_name(dir: &str) -> Option<&str> {
    let start = dir.find(USERS_PREFIX)? + USERS_PREFIX.len();
    let rest = &dir[start..];
    let end = rest.find(LIBRARY_SEGMENT)?;
    let name = &rest[..end];
    (!name.is_empty() && !name.contains('/')).then_some(name)
}

/// Rewrite a cached path recorded under another console user
///
/// Returns the path unchanged when either name is unknown or both match.
pub fn localize_path(pathname: &str, console_user: Option<&str>) -> String {
    let dir = Path::new(pathname)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    match (home_short_name(&dir), console_user) {
        (Some(recorded), Some(current)) if recorded != current => {
            debug!(
                "Recorded home dir {} and logged in user {} do not match; updating cache path",
                recorded, current
            );
            pathname.replace(recorded, current)
        }
        _ => pathname.to_string(),
    }
}

/// Recreates cached downloads as sparse placeholders
pub struct PlaceholderReplicator<'a> {
    attrs: &'a dyn AttributeStore,
    system: &'a dyn SystemInfo,
}

impl<'a> PlaceholderReplicator<'a> {
    /// Create a replicator over the given attribute backend and host system
    pub fn new(attrs: &'a dyn AttributeStore, system: &'a dyn SystemInfo) -> Self {
        Self { attrs, system }
    }

    /// Replay every record of every entry; individual failures never abort the batch
    pub async fn replicate(&self, cache: &MetadataCache) -> ReplicationSummary {
        let mut summary = ReplicationSummary::default();
        if cache.is_empty() {
            debug!("Metadata cache is empty; nothing to replicate");
            return summary;
        }

        let console_user = self.system.console_user().await;

        for (key, entry) in cache {
            for record in &entry.download_metadata {
                match self.replicate_record(key, record, console_user.as_deref()).await {
                    Ok(path) => {
                        summary.written += 1;
                        debug!("Replicated {} for {}", path.display(), key);
                    }
                    Err(e) => {
                        summary.skipped += 1;
                        error!(
                            "Issue when populating recipe '{}' metadata! Error is '{}' for provided record {:?}",
                            key, e, record
                        );
                    }
                }
            }
        }

        info!(
            "Replicated {} cached download(s), skipped {}",
            summary.written, summary.skipped
        );
        summary
    }

    async fn replicate_record(
        &self,
        key: &str,
        record: &DownloadRecord,
        console_user: Option<&str>,
    ) -> RunnerResult<PathBuf> {
        let pathname = record
            .pathname
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RunnerError::invalid_record(key, "missing pathname"))?;
        let size = record.size().ok_or_else(|| {
            RunnerError::invalid_record(
                key,
                format!("invalid dl_size_in_bytes {:?}", record.dl_size_in_bytes),
            )
        })?;

        let path = PathBuf::from(localize_path(pathname, console_user));
        let dir = path
            .parent()
            .ok_or_else(|| RunnerError::invalid_record(key, "pathname has no parent directory"))?;
        debug!("Found previous cache path {}", dir.display());

        if !dir.exists() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| RunnerError::io(format!("creating directory {}", dir.display()), e))?;
        }

        write_sparse(&path, size).await?;

        match record.etag.as_deref().filter(|v| !v.is_empty()) {
            Some(etag) => self.attrs.set(&path, attrs::ETAG, etag.as_bytes()).await?,
            None => info!("Skipping write of attribute 'etag' for {}; key is missing", key),
        }
        match record.last_modified.as_deref().filter(|v| !v.is_empty()) {
            Some(modified) => {
                self.attrs
                    .set(&path, attrs::LAST_MODIFIED, modified.as_bytes())
                    .await?
            }
            None => info!(
                "Skipping write of attribute 'last_modified' for {}; key is missing",
                key
            ),
        }

        info!(
            "Wrote file with xattrs and byte size {} to {}",
            size,
            path.display()
        );
        Ok(path)
    }
}

/// Create (or truncate) `path` and extend it to `size` without writing data
async fn write_sparse(path: &Path, size: u64) -> RunnerResult<()> {
    let file = fs::File::create(path)
        .await
        .map_err(|e| RunnerError::io(format!("creating placeholder {}", path.display()), e))?;
    file.set_len(size)
        .await
        .map_err(|e| RunnerError::io(format!("sizing placeholder {}", path.display()), e))?;
    Ok(())
}
