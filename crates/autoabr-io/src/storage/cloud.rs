use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{Error as ObjectStoreError, ObjectStore};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::warn;

#[cfg(feature = "s3")]
use autoabr_core::config::StorageConfig;
#[cfg(feature = "s3")]
use object_store::aws::AmazonS3Builder;

use super::{ArtifactStore, RetryConfig};
use crate::error::{Error, Result};
use crate::uri::s3_uri;

/// Artifact storage on one object store bucket.
///
/// Accepts bare keys or full `s3://<bucket>/<key>` URIs as locations.
pub struct CloudStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    retry: RetryConfig,
}

impl CloudStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            retry,
        }
    }

    /// S3 bucket using credentials from the standard AWS environment variables.
    #[cfg(feature = "s3")]
    pub fn s3(bucket: &str, cfg: &StorageConfig) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = &cfg.aws_region {
            builder = builder.with_region(region);
        }
        let store = builder
            .build()
            .map_err(|e| Error::Config(format!("object_store builder error: {e}")))?;
        Ok(Self::new(Arc::new(store), bucket, RetryConfig::from(cfg)))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key_for<'a>(&self, location: &'a str) -> &'a str {
        let root = format!("s3://{}/", self.bucket);
        location.strip_prefix(root.as_str()).unwrap_or(location).trim_start_matches('/')
    }

    fn object_path(&self, location: &str) -> ObjectPath {
        ObjectPath::from(self.key_for(location))
    }

    async fn run_with_retry<F, Fut, T>(&self, location: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = object_store::Result<T>>,
    {
        let mut attempt = 0usize;
        let mut backoff = self.retry.initial_backoff;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(ObjectStoreError::NotFound { .. }) => {
                    return Err(Error::NotFound(self.uri_for(location)));
                }
                Err(err) => {
                    if attempt >= self.retry.max_retries || !is_retryable(&err) {
                        return Err(Error::Storage(format!("{}: {err}", self.uri_for(location))));
                    }
                    attempt += 1;
                    warn!(uri = %self.uri_for(location), attempt, error = %err, "retrying object store request");
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.retry.max_backoff);
                }
            }
        }
    }
}

fn is_retryable(err: &ObjectStoreError) -> bool {
    match err {
        ObjectStoreError::NotFound { .. } => false,
        ObjectStoreError::AlreadyExists { .. } => false,
        ObjectStoreError::InvalidPath { .. } => false,
        ObjectStoreError::NotSupported { .. } => false,
        _ => true,
    }
}

fn local_io(err: std::io::Error) -> ObjectStoreError {
    ObjectStoreError::Generic {
        store: "local",
        source: Box::new(err),
    }
}

#[async_trait]
impl ArtifactStore for CloudStore {
    fn uri_for(&self, location: &str) -> String {
        s3_uri(&self.bucket, self.key_for(location))
    }

    async fn exists(&self, location: &str) -> Result<bool> {
        let path = self.object_path(location);
        let head = self
            .run_with_retry(location, || {
                let store = Arc::clone(&self.store);
                let path = path.clone();
                async move { store.head(&path).await }
            })
            .await;
        match head {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.object_path(location);
        let bytes = self
            .run_with_retry(location, || {
                let store = Arc::clone(&self.store);
                let path = path.clone();
                async move { store.get(&path).await?.bytes().await }
            })
            .await?;
        Ok(bytes.to_vec())
    }

    async fn write(&self, location: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.object_path(location);
        let data = Bytes::from(bytes);
        self.run_with_retry(location, || {
            let store = Arc::clone(&self.store);
            let path = path.clone();
            let data = data.clone();
            async move { store.put(&path, data).await.map(|_| ()) }
        })
        .await
    }

    async fn upload_file(&self, source: &Path, location: &str) -> Result<()> {
        let path = self.object_path(location);
        let source = source.to_path_buf();
        self.run_with_retry(location, || {
            let store = Arc::clone(&self.store);
            let path = path.clone();
            let source = source.clone();
            async move {
                let file = tokio::fs::File::open(&source).await.map_err(local_io)?;
                let (id, mut writer) = store.put_multipart(&path).await?;
                let copied = tokio::io::copy(&mut BufReader::new(file), &mut writer).await;
                let finished = match copied {
                    Ok(_) => writer.shutdown().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = finished {
                    let _ = store.abort_multipart(&path, &id).await;
                    return Err(local_io(e));
                }
                Ok(())
            }
        })
        .await
    }

    async fn download_file(&self, location: &str, target: &Path) -> Result<()> {
        let path = self.object_path(location);
        let got = self
            .run_with_retry(location, || {
                let store = Arc::clone(&self.store);
                let path = path.clone();
                async move { store.get(&path).await }
            })
            .await?;

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(target).await?;
        let mut stream = got.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Storage(format!("{}: {e}", self.uri_for(location))))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let src = self.object_path(from);
        let dst = self.object_path(to);
        self.run_with_retry(from, || {
            let store = Arc::clone(&self.store);
            let src = src.clone();
            let dst = dst.clone();
            async move { store.copy(&src, &dst).await }
        })
        .await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let key = self.key_for(prefix).trim_end_matches('/');
        let prefix_path = (!key.is_empty()).then(|| ObjectPath::from(key));
        let mut stream = self.store.list(prefix_path.as_ref());
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            let meta = item.map_err(|e| Error::Storage(format!("{}: {e}", self.uri_for(prefix))))?;
            out.push(self.uri_for(meta.location.as_ref()));
        }
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn store() -> CloudStore {
        CloudStore::new(Arc::new(InMemory::new()), "media", RetryConfig::default())
    }

    #[tokio::test]
    async fn keys_and_uris_address_the_same_object() {
        let s = store();
        s.write("results/job/HD/a_vmaf.json", b"{}".to_vec()).await.unwrap();
        assert!(s.exists("s3://media/results/job/HD/a_vmaf.json").await.unwrap());
        assert_eq!(s.uri_for("results/x"), "s3://media/results/x");
        assert_eq!(
            s.list("s3://media/results/job").await.unwrap(),
            vec!["s3://media/results/job/HD/a_vmaf.json".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_object_is_not_found_without_retry() {
        let s = CloudStore::new(
            Arc::new(InMemory::new()),
            "media",
            RetryConfig {
                max_retries: 5,
                initial_backoff: std::time::Duration::from_secs(60),
                max_backoff: std::time::Duration::from_secs(60),
            },
        );
        assert!(!s.exists("nope").await.unwrap());
        assert!(matches!(s.read("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn upload_and_download_stream_files() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("ref.mp4");
        tokio::fs::write(&src, vec![7u8; 4096]).await.unwrap();

        let s = store();
        s.upload_file(&src, "job/reference.mp4").await.unwrap();
        let dst = dir.path().join("copy/ref.mp4");
        s.download_file("job/reference.mp4", &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), vec![7u8; 4096]);

        s.copy("job/reference.mp4", "job/ref2.mp4").await.unwrap();
        assert!(s.exists("job/ref2.mp4").await.unwrap());
    }
}
