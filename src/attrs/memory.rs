//! In-memory attribute store

use super::AttributeStore;
use crate::error::RunnerResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Attribute store backed by a map, keyed by (path, name)
#[derive(Debug, Default)]
pub struct MemoryAttributes {
    values: Mutex<HashMap<(PathBuf, String), Vec<u8>>>,
}

impl MemoryAttributes {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` carries attribute `name`
    pub fn contains(&self, path: &Path, name: &str) -> bool {
        self.values
            .lock()
            .map(|v| v.contains_key(&(path.to_path_buf(), name.to_string())))
            .unwrap_or(false)
    }

    /// Number of attributes recorded across all paths
    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    /// Whether no attribute has been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AttributeStore for MemoryAttributes {
    async fn get(&self, path: &Path, name: &str) -> RunnerResult<Option<Vec<u8>>> {
        Ok(self
            .values
            .lock()
            .ok()
            .and_then(|v| v.get(&(path.to_path_buf(), name.to_string())).cloned()))
    }

    async fn set(&self, path: &Path, name: &str, value: &[u8]) -> RunnerResult<()> {
        if let Ok(mut values) = self.values.lock() {
            values.insert((path.to_path_buf(), name.to_string()), value.to_vec());
        }
        Ok(())
    }
}
