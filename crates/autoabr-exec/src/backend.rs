//! The execution backend capability and its construction from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use autoabr_core::config::{BackendConfig, EngineConfig};
use autoabr_core::{QualityModel, Resolution, Variables};
use autoabr_io::ArtifactStore;
use serde_json::Value;

use crate::cloud::CloudBackend;
use crate::encore::EncoreBackend;
use crate::error::Result;
use crate::local::LocalBackend;

/// Progress of a running encode pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeProgress {
    pub output: String,
    pub pass: u8,
    /// 0..=100, relative to the probed input duration.
    pub percent: f64,
}

pub type ProgressFn = Arc<dyn Fn(&TranscodeProgress) + Send + Sync>;

/// Produces encoded variants and quality results.
///
/// Both operations are cache-aware: when the artifact already exists at
/// `output` the expensive step is skipped. `Ok(None)` is the per-pair failure
/// result (job ended in error, wait timed out); `Err` is reserved for failures
/// the backend could not even attempt to recover from, such as a rejected
/// submission or a failing subprocess.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcode(
        &self,
        input: &str,
        resolution: Resolution,
        bitrate: u64,
        output: &str,
        variables: &Variables,
    ) -> Result<Option<String>>;

    async fn analyze_quality(
        &self,
        reference: &str,
        distorted: &str,
        output: &str,
        model: QualityModel,
    ) -> Result<Option<String>>;

    /// Where `transcode` would have put `output`; used when transcoding is skipped.
    fn variant_location(&self, output: &str) -> String;

    /// Make the reference reachable by the backend's tools.
    async fn prepare_reference(&self, reference: &str, _job_name: &str) -> Result<String> {
        Ok(reference.to_string())
    }

    /// Store that resolves the locations returned by `analyze_quality`.
    fn artifact_store(&self) -> Arc<dyn ArtifactStore>;

    /// Release remote resources once every pair has run.
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}

pub async fn build_backend(
    cfg: &BackendConfig,
    encoding_profile: &Value,
    engine: &EngineConfig,
) -> Result<Arc<dyn ExecutionBackend>> {
    Ok(match cfg {
        BackendConfig::Local(local) => Arc::new(LocalBackend::new(local.clone(), encoding_profile)?),
        BackendConfig::Cloud(cloud) => {
            Arc::new(CloudBackend::from_config(cloud.clone(), encoding_profile, engine).await?)
        }
        BackendConfig::Encore(encore) => {
            Arc::new(EncoreBackend::from_config(encore.clone(), encoding_profile, engine)?)
        }
    })
}
