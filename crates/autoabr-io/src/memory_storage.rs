//! In-memory artifact store for testing.
//!
//! Locations are plain keys; nothing touches the filesystem except the
//! explicit `upload_file`/`download_file` transfers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::storage::ArtifactStore;

/// Thread-safe in-memory store keyed by location.
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pre-populate an artifact (used by tests).
    pub fn insert(&self, location: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.data().insert(location.into(), bytes.into());
    }

    pub fn contains(&self, location: &str) -> bool {
        self.data().contains_key(location)
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// Number of write-like operations (write, upload, copy) performed.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    fn uri_for(&self, location: &str) -> String {
        location.to_string()
    }

    async fn exists(&self, location: &str) -> Result<bool> {
        Ok(self.contains(location))
    }

    async fn read(&self, location: &str) -> Result<Vec<u8>> {
        self.data()
            .get(location)
            .cloned()
            .ok_or_else(|| Error::NotFound(location.to_string()))
    }

    async fn write(&self, location: &str, bytes: Vec<u8>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.data().insert(location.to_string(), bytes);
        Ok(())
    }

    async fn upload_file(&self, source: &Path, location: &str) -> Result<()> {
        let bytes = tokio::fs::read(source).await?;
        self.write(location, bytes).await
    }

    async fn download_file(&self, location: &str, target: &Path) -> Result<()> {
        let bytes = self.read(location).await?;
        tokio::fs::write(target, bytes).await?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let bytes = self.read(from).await?;
        self.write(to, bytes).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_copy_list() {
        let store = MemoryStore::new();
        store.write("a/1.json", b"one".to_vec()).await.unwrap();
        store.copy("a/1.json", "b/1.json").await.unwrap();

        assert_eq!(store.read("b/1.json").await.unwrap(), b"one");
        assert_eq!(store.list("a/").await.unwrap(), vec!["a/1.json".to_string()]);
        assert_eq!(store.write_count(), 2);
        assert!(matches!(store.read("c").await, Err(Error::NotFound(_))));
    }
}
