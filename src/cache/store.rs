//! Cross-run download metadata cache
//!
//! A single JSON document mapping recipe file name to the downloads that
//! recipe produced last time. Missing or unreadable files mean "no history".

use crate::error::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const DOWNLOAD_METADATA: &str = "download_metadata";

/// Recipe file name -> cached entry
pub type MetadataCache = BTreeMap<String, CacheEntry>;

/// One recorded or observed download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Absolute path of the downloaded file; records without it are unusable
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub pathname: Option<String>,

    /// Source URL (only reliable for a recipe's single download)
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Opaque HTTP cache validator
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Opaque server timestamp
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// Decimal byte size
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub dl_size_in_bytes: Option<String>,
}

impl DownloadRecord {
    /// Parsed byte size
    pub fn size(&self) -> Option<u64> {
        self.dl_size_in_bytes
            .as_deref()
            .and_then(|s| s.trim().parse().ok())
    }

    /// Whether any provenance or size field is populated
    pub fn has_attributes(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some() || self.dl_size_in_bytes.is_some()
    }
}

/// Cached state for one recipe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Set when a run actually observed attributes
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub cache_timestamp: Option<String>,

    /// Index 0 is the primary download; the rest are bonus downloads
    #[serde(default)]
    pub download_metadata: Vec<DownloadRecord>,

    /// Fields written by other tools, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CacheEntry {
    /// The primary download, if one was recorded
    pub fn primary(&self) -> Option<&DownloadRecord> {
        self.download_metadata.first()
    }
}

/// Loads and saves the metadata cache file
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// Create a store for the given cache file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the full mapping; never fails
    ///
    /// Entries and records of the wrong shape are logged and skipped one by
    /// one; everything else still loads.
    pub async fn load(&self) -> MetadataCache {
        self.load_raw()
            .await
            .into_iter()
            .filter_map(|(key, value)| decode_entry(&key, value).map(|entry| (key, entry)))
            .collect()
    }

    /// The file as an untyped object, so unknown shapes can be carried through
    async fn load_raw(&self) -> Map<String, Value> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No metadata cache at {}; treating as new build", self.path.display());
                return Map::new();
            }
            Err(e) => {
                warn!("Unable to read metadata cache {}: {}", self.path.display(), e);
                return Map::new();
            }
        };

        if content.trim().is_empty() {
            return Map::new();
        }

        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("Ignoring metadata cache {}: not a JSON object", self.path.display());
                Map::new()
            }
            Err(e) => {
                warn!("Ignoring malformed metadata cache {}: {}", self.path.display(), e);
                Map::new()
            }
        }
    }

    /// Write the full mapping with four-space indentation
    pub async fn save(&self, cache: &MetadataCache) -> RunnerResult<()> {
        self.write(&serde_json::to_value(cache)?).await
    }

    async fn write(&self, value: &Value) -> RunnerResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    RunnerError::io(format!("creating directory {}", parent.display()), e)
                })?;
            }
        }

        let content = to_pretty_json(value)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .map_err(|e| RunnerError::io(format!("writing metadata cache {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| {
            RunnerError::io(format!("replacing metadata cache {}", self.path.display()), e)
        })?;

        debug!("Metadata cache written to {}", self.path.display());
        Ok(())
    }

    /// Replace one recipe's entry on disk, leaving every other key untouched
    ///
    /// Other entries are carried over as raw JSON, including ones `load`
    /// could not decode.
    pub async fn merge_entry(&self, key: &str, entry: &CacheEntry) -> RunnerResult<()> {
        let mut on_disk = self.load_raw().await;
        on_disk.insert(key.to_string(), serde_json::to_value(entry)?);
        self.write(&Value::Object(on_disk)).await?;
        info!("Metadata cache written to: {}", self.path.display());
        Ok(())
    }
}

/// Accept strings, numbers and booleans as text; anything else is absent
fn lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Decode one entry, dropping download records that are not usable objects
fn decode_entry(key: &str, value: Value) -> Option<CacheEntry> {
    let Value::Object(mut fields) = value else {
        warn!("Skipping cached entry {}: expected an object", key);
        return None;
    };

    let raw_records = match fields.remove(DOWNLOAD_METADATA) {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => vec![],
        Some(other) => {
            warn!("Skipping download_metadata for {}: expected a list, got {}", key, other);
            vec![]
        }
    };

    let mut entry: CacheEntry = match serde_json::from_value(Value::Object(fields)) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Skipping cached entry {}: {}", key, e);
            return None;
        }
    };
    entry.download_metadata = raw_records
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<DownloadRecord>(raw.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping cached download record {} for {}: {}", raw, key, e);
                None
            }
        })
        .collect();
    Some(entry)
}

fn to_pretty_json(value: &Value) -> RunnerResult<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(path: &str, size: &str) -> DownloadRecord {
        DownloadRecord {
            pathname: Some(path.to_string()),
            dl_size_in_bytes: Some(size.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("absent.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn empty_and_corrupt_files_load_empty() {
        let temp = TempDir::new().unwrap();
        let empty = temp.path().join("empty.json");
        std::fs::write(&empty, "").unwrap();
        let corrupt = temp.path().join("corrupt.json");
        std::fs::write(&corrupt, "{\"Foo.recipe\": [").unwrap();

        assert!(CacheStore::new(empty).load().await.is_empty());
        assert!(CacheStore::new(corrupt).load().await.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_mapping() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("meta.json"));

        let mut cache = MetadataCache::new();
        let mut entry = CacheEntry {
            cache_timestamp: Some("2024-01-02 03:04:05.000006".into()),
            download_metadata: vec![record("/Users/ci/Library/AutoPkg/Cache/x/downloads/a.dmg", "42")],
            ..Default::default()
        };
        entry
            .extra
            .insert("note".into(), serde_json::json!({"kept": true}));
        cache.insert("Alpha.download.recipe".into(), entry);
        cache.insert("Beta.pkg.recipe".into(), CacheEntry::default());

        store.save(&cache).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded, cache);

        store.save(&loaded).await.unwrap();
        assert_eq!(store.load().await, cache);
    }

    #[tokio::test]
    async fn save_uses_four_space_indent() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("meta.json"));
        let mut cache = MetadataCache::new();
        cache.insert("A.recipe".into(), CacheEntry::default());

        store.save(&cache).await.unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n    \"A.recipe\""));
    }

    #[tokio::test]
    async fn merge_entry_keeps_other_keys() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("meta.json"));

        let mut cache = MetadataCache::new();
        cache.insert(
            "Other.recipe".into(),
            CacheEntry {
                download_metadata: vec![record("/tmp/other.dmg", "1")],
                ..Default::default()
            },
        );
        store.save(&cache).await.unwrap();

        let mine = CacheEntry {
            download_metadata: vec![record("/tmp/mine.dmg", "2")],
            ..Default::default()
        };
        store.merge_entry("Mine.recipe", &mine).await.unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["Other.recipe"], cache["Other.recipe"]);
        assert_eq!(loaded["Mine.recipe"], mine);
    }

    #[tokio::test]
    async fn misshapen_records_are_skipped_individually() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("meta.json");
        std::fs::write(
            &path,
            r#"{
                "Good.recipe": {"download_metadata": [{"pathname": "/tmp/good.dmg", "dl_size_in_bytes": "5"}]},
                "Odd.recipe": {"download_metadata": ["not-a-dict"]},
                "Mixed.recipe": {"download_metadata": [7, {"pathname": "/tmp/mixed.dmg"}]},
                "Scalar.recipe": "nope"
            }"#,
        )
        .unwrap();
        let store = CacheStore::new(&path);

        let cache = store.load().await;
        assert_eq!(cache.len(), 3);
        assert_eq!(cache["Good.recipe"].download_metadata, vec![record("/tmp/good.dmg", "5")]);
        assert!(cache["Odd.recipe"].download_metadata.is_empty());
        assert_eq!(cache["Mixed.recipe"].download_metadata.len(), 1);
        assert!(!cache.contains_key("Scalar.recipe"));
    }

    #[tokio::test]
    async fn merge_entry_carries_undecodable_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("meta.json");
        std::fs::write(
            &path,
            r#"{
                "Good.recipe": {"download_metadata": [{"pathname": "/tmp/good.dmg", "dl_size_in_bytes": "5"}]},
                "Odd.recipe": {"download_metadata": ["not-a-dict"]},
                "Scalar.recipe": "nope"
            }"#,
        )
        .unwrap();
        let store = CacheStore::new(&path);

        let mine = CacheEntry {
            download_metadata: vec![record("/tmp/mine.dmg", "2")],
            ..Default::default()
        };
        store.merge_entry("Mine.recipe", &mine).await.unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw["Good.recipe"]["download_metadata"][0]["pathname"],
            "/tmp/good.dmg"
        );
        assert_eq!(raw["Odd.recipe"]["download_metadata"][0], "not-a-dict");
        assert_eq!(raw["Scalar.recipe"], "nope");
        assert_eq!(store.load().await["Mine.recipe"], mine);
    }

    #[test]
    fn record_fields_are_lenient() {
        let parsed: DownloadRecord =
            serde_json::from_str(r#"{"pathname": null, "dl_size_in_bytes": 2048, "etag": ["x"]}"#)
                .unwrap();
        assert_eq!(parsed.pathname, None);
        assert_eq!(parsed.dl_size_in_bytes.as_deref(), Some("2048"));
        assert_eq!(parsed.etag, None);
    }

    #[test]
    fn record_size_parses() {
        assert_eq!(record("/a", "1048576").size(), Some(1_048_576));
        assert_eq!(record("/a", "big").size(), None);
    }
}
