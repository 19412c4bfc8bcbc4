//! Artifact storage adapters.
//!
//! - `fs`: Local filesystem (default).
//! - `cloud`: Object stores built on top of `object_store` (S3 when the `s3`
//!   feature is enabled; any `ObjectStore` can be wrapped for tests).
//!
//! Also exposes `RetryConfig` and a builder that chooses the adapter from an
//! artifact location (`out/job`, `file:///tmp/job`, `s3://bucket/prefix`).

mod cloud;
mod fs;

pub use cloud::CloudStore;
pub use fs::FsStore;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoabr_core::config::StorageConfig;

use crate::error::{Error, Result};
use crate::uri::ArtifactLocation;

/// Idempotent artifact storage used by execution backends and result loading.
///
/// Locations are adapter-relative strings: paths for the filesystem, keys (or
/// full `s3://bucket/key` URIs) for object stores.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Canonical identifier handed to external tools and services.
    fn uri_for(&self, location: &str) -> String;

    async fn exists(&self, location: &str) -> Result<bool>;

    /// Fails with [`Error::NotFound`] when the artifact is absent.
    async fn read(&self, location: &str) -> Result<Vec<u8>>;

    async fn write(&self, location: &str, bytes: Vec<u8>) -> Result<()>;

    /// Stream a local file into the store.
    async fn upload_file(&self, source: &Path, location: &str) -> Result<()>;

    /// Stream an artifact into a local file.
    async fn download_file(&self, location: &str, target: &Path) -> Result<()>;

    async fn copy(&self, from: &str, to: &str) -> Result<()>;

    /// Every artifact under `prefix`, as locations accepted by `read`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Retry/backoff configuration shared across object store adapters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&StorageConfig> for RetryConfig {
    fn from(cfg: &StorageConfig) -> Self {
        Self {
            max_retries: cfg.retry_max_retries,
            initial_backoff: Duration::from_millis(cfg.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.retry_max_backoff_ms.max(cfg.retry_initial_backoff_ms)),
        }
    }
}

/// Build the store that owns `location`, returning it with the store-relative
/// location (a path or a key prefix).
pub fn build_store_for(location: &str, cfg: &StorageConfig) -> Result<(Arc<dyn ArtifactStore>, String)> {
    match ArtifactLocation::parse(location)? {
        ArtifactLocation::Local(path) => {
            let rel = path.to_string_lossy().into_owned();
            Ok((Arc::new(FsStore::new()), rel))
        }
        ArtifactLocation::S3 { bucket, key } => {
            #[cfg(feature = "s3")]
            {
                let store = CloudStore::s3(&bucket, cfg)?;
                Ok((Arc::new(store), key))
            }

            #[cfg(not(feature = "s3"))]
            {
                let _ = (bucket, key, cfg);
                Err(Error::Config(
                    "autoabr was built without the `s3` feature; rebuild with `--features autoabr-io/s3`"
                        .into(),
                ))
            }
        }
    }
}
