use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::ArtifactStore;
use crate::error::{Error, Result};

/// Local filesystem storage (rooted at the host filesystem).
#[derive(Debug, Clone, Default)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsStore {
    fn uri_for(&self, location: &str) -> String {
        location.to_string()
    }

    async fn exists(&self, location: &str) -> Result<bool> {
        Ok(fs::try_exists(location).await?)
    }

    async fn read(&self, location: &str) -> Result<Vec<u8>> {
        match fs::read(location).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(location.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, location: &str, bytes: Vec<u8>) -> Result<()> {
        let path = Path::new(location);
        ensure_parent(path).await?;
        fs::write(path, bytes).await?;
        Ok(())
    }

    async fn upload_file(&self, source: &Path, location: &str) -> Result<()> {
        let target = Path::new(location);
        if source == target {
            return Ok(());
        }
        ensure_parent(target).await?;
        fs::copy(source, target).await?;
        Ok(())
    }

    async fn download_file(&self, location: &str, target: &Path) -> Result<()> {
        self.upload_file(Path::new(location), &target.to_string_lossy()).await
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        if !fs::try_exists(from).await? {
            return Err(Error::NotFound(from.to_string()));
        }
        self.upload_file(Path::new(from), to).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = PathBuf::from(prefix);
        let mut results = Vec::new();

        let meta = match fs::metadata(&root).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
            Err(e) => return Err(e.into()),
        };
        if meta.is_file() {
            results.push(root.to_string_lossy().into_owned());
            return Ok(results);
        }

        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else {
                    results.push(path.to_string_lossy().into_owned());
                }
            }
        }
        results.sort();
        Ok(results)
    }
}
