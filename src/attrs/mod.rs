//! Provenance attributes stored on download files
//!
//! AutoPkg's URLDownloader keeps the server's etag and last-modified values
//! as extended attributes on each download and compares them on the next
//! run. Reconciliation code only talks to the `AttributeStore` trait so it
//! stays platform-neutral; `NativeAttributes` is the real backend and
//! `MemoryAttributes` an in-memory stand-in.

mod memory;
mod native;

pub use memory::MemoryAttributes;
pub use native::NativeAttributes;

use crate::error::RunnerResult;
use async_trait::async_trait;
use std::path::Path;

/// Attribute written by URLDownloader holding the HTTP etag
pub const ETAG: &str = "com.github.autopkg.etag";
/// Attribute written by URLDownloader holding the HTTP Last-Modified value
pub const LAST_MODIFIED: &str = "com.github.autopkg.last-modified";
/// Read-only attribute some download paths carry with the source URL(s)
pub const WHERE_FROMS: &str = "com.apple.metadata:kMDItemWhereFroms";

/// Get/set a named attribute on a path
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Read an attribute; `Ok(None)` when the path does not carry it
    async fn get(&self, path: &Path, name: &str) -> RunnerResult<Option<Vec<u8>>>;

    /// Write (or replace) an attribute
    async fn set(&self, path: &Path, name: &str, value: &[u8]) -> RunnerResult<()>;
}

/// Read an attribute as trimmed text; unreadable or empty values are `None`
pub async fn read_text(store: &dyn AttributeStore, path: &Path, name: &str) -> Option<String> {
    match store.get(path, name).await {
        Ok(Some(raw)) => {
            let text = String::from_utf8_lossy(&raw).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("{}", e);
            None
        }
    }
}

/// Read the source URL attribute
///
/// The value is usually a binary plist array of strings; the first string
/// wins. Anything else falls back to the raw text.
pub async fn read_source_url(store: &dyn AttributeStore, path: &Path) -> Option<String> {
    let raw = match store.get(path, WHERE_FROMS).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::debug!("{}", e);
            return None;
        }
    };

    if let Ok(value) = plist::Value::from_reader(std::io::Cursor::new(&raw)) {
        let first = match value {
            plist::Value::Array(items) => items
                .into_iter()
                .find_map(|item| item.into_string()),
            plist::Value::String(s) => Some(s),
            _ => None,
        };
        if first.is_some() {
            return first;
        }
    }

    let text = String::from_utf8_lossy(&raw).trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn read_text_trims_and_drops_empty() {
        let store = MemoryAttributes::new();
        let path = PathBuf::from("/tmp/a.dmg");
        store.set(&path, ETAG, b"\"abc\"\n").await.unwrap();
        store.set(&path, LAST_MODIFIED, b"  ").await.unwrap();

        assert_eq!(read_text(&store, &path, ETAG).await.as_deref(), Some("\"abc\""));
        assert_eq!(read_text(&store, &path, LAST_MODIFIED).await, None);
    }

    #[tokio::test]
    async fn source_url_from_binary_plist() {
        let store = MemoryAttributes::new();
        let path = PathBuf::from("/tmp/b.zip");
        let mut encoded = Vec::new();
        plist::Value::Array(vec![
            plist::Value::String("https://example.com/b.zip".into()),
            plist::Value::String("https://example.com/".into()),
        ])
        .to_writer_binary(&mut encoded)
        .unwrap();
        store.set(&path, WHERE_FROMS, &encoded).await.unwrap();

        assert_eq!(
            read_source_url(&store, &path).await.as_deref(),
            Some("https://example.com/b.zip")
        );
    }

    #[tokio::test]
    async fn source_url_from_plain_text() {
        let store = MemoryAttributes::new();
        let path = PathBuf::from("/tmp/c.zip");
        store
            .set(&path, WHERE_FROMS, b"https://example.com/c.zip")
            .await
            .unwrap();

        assert_eq!(
            read_source_url(&store, &path).await.as_deref(),
            Some("https://example.com/c.zip")
        );
    }
}
