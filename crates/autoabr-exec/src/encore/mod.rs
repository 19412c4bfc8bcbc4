//! Encore backend: transcoding through an Encore instance, scoring locally.
//!
//! One Encore instance is created on first use and deleted when the run
//! finishes. Each pair becomes one Encore job whose inline profile carries a
//! single encode at the pair's resolution and bitrate. Finished variants are
//! downloaded into the job directory and measured with easyVmaf, exactly as
//! the local backend does.

#[cfg(feature = "encore")]
pub mod http;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoabr_core::config::{EncoreBackendConfig, EngineConfig};
use autoabr_core::naming::{artifact_stem_of, basename, dirname, join};
use autoabr_core::{QualityModel, Resolution, Variables};
use autoabr_io::{ArtifactStore, FsStore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn, Instrument};

use crate::backend::ExecutionBackend;
use crate::error::{ExecError, Result};
use crate::local::{partial_location, LocalBackend};
use crate::metrics;
use crate::process::CommandRunner;
#[cfg(feature = "encore")]
use crate::process::TokioRunner;
use crate::template::{EncodeTemplate, TemplateParams};

#[cfg(feature = "encore")]
pub use http::EncoreHttp;

/// Poll intervals stop growing past this.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceResources {
    pub enqueue_job: Link,
    pub list_jobs: Link,
}

/// A running Encore instance as returned by the instance API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoreInstance {
    pub name: String,
    pub url: String,
    pub resources: InstanceResources,
}

impl EncoreInstance {
    /// Absolute URL of a file reported in a job's output.
    pub fn file_url(&self, file: &str) -> String {
        if file.contains("://") {
            file.to_string()
        } else {
            format!("{}/{}", self.url.trim_end_matches('/'), file.trim_start_matches('/'))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInput {
    pub uri: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoreJobRequest {
    /// Encore profile as YAML.
    pub inline_profile: String,
    pub output_folder: String,
    pub base_name: String,
    pub inputs: Vec<JobInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoreOutput {
    pub file: String,
    #[serde(default)]
    pub video_streams: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EncoreJob {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output: Vec<EncoreOutput>,
}

impl EncoreJob {
    /// The output holding video, or the first output when streams are not reported.
    pub fn video_output(&self) -> Option<&EncoreOutput> {
        self.output
            .iter()
            .find(|o| !o.video_streams.is_empty())
            .or_else(|| self.output.first())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoreStatus {
    Queued,
    InProgress,
    Successful,
    Failed,
    Cancelled,
}

impl EncoreStatus {
    /// Unrecognised states count as still running.
    pub fn from_service(status: &str) -> Self {
        match status {
            "QUEUED" | "NEW" => EncoreStatus::Queued,
            "SUCCESSFUL" => EncoreStatus::Successful,
            "FAILED" => EncoreStatus::Failed,
            "CANCELLED" => EncoreStatus::Cancelled,
            _ => EncoreStatus::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EncoreStatus::Successful | EncoreStatus::Failed | EncoreStatus::Cancelled)
    }
}

/// The Encore REST surface used by the backend.
#[async_trait]
pub trait EncoreApi: Send + Sync {
    async fn create_instance(&self) -> Result<EncoreInstance>;

    /// Returns the job id.
    async fn enqueue(&self, instance: &EncoreInstance, request: &EncoreJobRequest) -> Result<String>;

    /// `None` when the instance does not list the job.
    async fn job(&self, instance: &EncoreInstance, job_id: &str) -> Result<Option<EncoreJob>>;

    /// Stream `url` into `target`.
    async fn download(&self, url: &str, target: &Path) -> Result<()>;

    async fn delete_instance(&self, instance: &EncoreInstance) -> Result<()>;
}

/// Encore profile with its first encode as the per-pair template.
#[derive(Debug, Clone)]
pub struct EncoreProfile {
    template: EncodeTemplate,
}

impl EncoreProfile {
    pub fn from_value(profile: &Value) -> Result<Self> {
        let has_encode = profile
            .get("encodes")
            .and_then(Value::as_array)
            .and_then(|e| e.first())
            .is_some_and(Value::is_object);
        if !has_encode {
            return Err(ExecError::Config(
                "encore encoding profile needs a non-empty `encodes` list".into(),
            ));
        }
        Ok(Self {
            template: EncodeTemplate::from_value(profile)?,
        })
    }

    /// The profile reduced to one encode at the pair's resolution and bitrate.
    pub fn render(&self, params: &TemplateParams<'_>) -> Result<Value> {
        let mut profile = self.template.render(params)?;
        let mut encode = profile["encodes"][0].take();
        encode["width"] = json!(params.resolution.width);
        encode["height"] = json!(params.resolution.height);
        if !encode.get("params").is_some_and(Value::is_object) {
            encode["params"] = json!({});
        }
        encode["params"]["b:v"] = json!(params.bitrate);
        profile["encodes"] = json!([encode]);
        Ok(profile)
    }

    pub fn render_yaml(&self, params: &TemplateParams<'_>) -> Result<String> {
        serde_yaml::to_string(&self.render(params)?).map_err(|e| ExecError::Template(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoreTiming {
    pub initial_poll: Duration,
    pub post_creation_delay: Duration,
    pub max_wait: Duration,
}

impl EncoreTiming {
    pub fn new(cfg: &EncoreBackendConfig, engine: &EngineConfig) -> Self {
        Self {
            initial_poll: Duration::from_millis(cfg.polling_interval_ms),
            post_creation_delay: Duration::from_millis(cfg.post_creation_delay_ms),
            max_wait: Duration::from_secs(engine.max_wait_secs),
        }
    }
}

/// Interval before poll number `poll` (0-based): tripled after every third
/// poll until it passes [`MAX_POLL_INTERVAL`].
pub fn poll_interval(initial: Duration, poll: u32) -> Duration {
    let mut interval = initial;
    for _ in 0..poll / 3 {
        if interval > MAX_POLL_INTERVAL {
            break;
        }
        interval = interval.saturating_mul(3);
    }
    interval
}

pub struct EncoreBackend {
    cfg: EncoreBackendConfig,
    profile: EncoreProfile,
    api: Arc<dyn EncoreApi>,
    analyzer: LocalBackend,
    store: Arc<FsStore>,
    timing: EncoreTiming,
    instance: OnceCell<EncoreInstance>,
    /// Remote reference URL and its local copy for scoring.
    reference: OnceCell<(String, String)>,
}

impl EncoreBackend {
    pub fn new(
        cfg: EncoreBackendConfig,
        encoding_profile: &Value,
        api: Arc<dyn EncoreApi>,
        runner: Arc<dyn CommandRunner>,
        timing: EncoreTiming,
    ) -> Result<Self> {
        cfg.validate().map_err(|e| ExecError::Config(e.to_string()))?;
        let analyzer = LocalBackend::with_runner(cfg.analysis_tools(), &Value::Null, runner)?;
        Ok(Self {
            profile: EncoreProfile::from_value(encoding_profile)?,
            cfg,
            api,
            analyzer,
            store: Arc::new(FsStore::new()),
            timing,
            instance: OnceCell::new(),
            reference: OnceCell::new(),
        })
    }

    #[cfg(feature = "encore")]
    pub fn from_config(cfg: EncoreBackendConfig, encoding_profile: &Value, engine: &EngineConfig) -> Result<Self> {
        let timing = EncoreTiming::new(&cfg, engine);
        let api = Arc::new(EncoreHttp::new(&cfg)?);
        Self::new(cfg, encoding_profile, api, Arc::new(TokioRunner), timing)
    }

    #[cfg(not(feature = "encore"))]
    pub fn from_config(_cfg: EncoreBackendConfig, _encoding_profile: &Value, _engine: &EngineConfig) -> Result<Self> {
        Err(ExecError::Config(
            "the encore pipeline needs the `encore` feature; rebuild with `--features encore`".into(),
        ))
    }

    async fn instance(&self) -> Result<&EncoreInstance> {
        self.instance
            .get_or_try_init(|| async {
                let instance = self.api.create_instance().await?;
                info!(instance = %instance.name, url = %instance.url, "encore instance created");
                if !self.timing.post_creation_delay.is_zero() {
                    sleep(self.timing.post_creation_delay).await;
                }
                Ok::<_, ExecError>(instance)
            })
            .await
    }

    /// Poll until the job reaches a terminal state. `None` on timeout, when
    /// the status cannot be fetched, or when the job vanishes.
    async fn await_job(&self, instance: &EncoreInstance, job_id: &str) -> Option<EncoreJob> {
        let deadline = Instant::now() + self.timing.max_wait;
        let mut polls = 0;
        loop {
            match self.api.job(instance, job_id).await {
                Ok(Some(job)) if EncoreStatus::from_service(&job.status).is_terminal() => return Some(job),
                Ok(Some(job)) => debug!(job_id, status = %job.status, "encore job running"),
                Ok(None) => {
                    error!(job_id, "encore job is no longer listed");
                    return None;
                }
                Err(e) => {
                    error!(job_id, error = %e, "could not fetch encore job");
                    return None;
                }
            }
            if Instant::now() >= deadline {
                warn!(job_id, "encore job did not finish within the wait ceiling");
                return None;
            }
            sleep(poll_interval(self.timing.initial_poll, polls)).await;
            polls += 1;
        }
    }

    async fn run_transcode(
        &self,
        input: &str,
        resolution: Resolution,
        bitrate: u64,
        output: &str,
        variables: &Variables,
    ) -> Result<Option<String>> {
        if self.store.exists(output).await? {
            info!(output, "variant exists, skipping encore job");
            return Ok(Some(output.to_string()));
        }
        let dir = dirname(output);
        if !dir.is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let base_name = artifact_stem_of(output).to_string();
        let inline_profile = self.profile.render_yaml(&TemplateParams {
            input,
            output: &base_name,
            resolution,
            bitrate,
            variables,
        })?;
        let request = EncoreJobRequest {
            inline_profile,
            output_folder: self.cfg.output_folder.clone(),
            base_name,
            inputs: vec![JobInput {
                uri: input.to_string(),
                kind: "AudioVideo".to_string(),
            }],
            duration: self.cfg.duration,
            priority: self.cfg.priority,
        };

        let instance = self.instance().await?;
        let job_id = self.api.enqueue(instance, &request).await?;
        info!(job_id, output, "encore job enqueued");

        let Some(job) = self.await_job(instance, &job_id).await else {
            return Ok(None);
        };
        if EncoreStatus::from_service(&job.status) != EncoreStatus::Successful {
            error!(job_id, status = %job.status, detail = job.message.as_deref().unwrap_or(""), "encore job failed");
            return Ok(None);
        }
        let Some(produced) = job.video_output() else {
            error!(job_id, "encore job finished without output");
            return Ok(None);
        };

        let partial = partial_location(output);
        let fetched = async {
            self.api.download(&instance.file_url(&produced.file), Path::new(&partial)).await?;
            tokio::fs::rename(&partial, output).await?;
            Ok::<_, ExecError>(())
        };
        if let Err(e) = fetched.await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        info!(job_id, output, "variant downloaded");
        Ok(Some(output.to_string()))
    }

    fn local_reference<'a>(&'a self, reference: &'a str) -> &'a str {
        match self.reference.get() {
            Some((remote, local)) if remote == reference => local,
            _ => reference,
        }
    }
}

#[async_trait]
impl ExecutionBackend for EncoreBackend {
    fn name(&self) -> &'static str {
        "encore"
    }

    async fn transcode(
        &self,
        input: &str,
        resolution: Resolution,
        bitrate: u64,
        output: &str,
        variables: &Variables,
    ) -> Result<Option<String>> {
        self.run_transcode(input, resolution, bitrate, output, variables)
            .instrument(metrics::transcode_span(output))
            .await
    }

    async fn analyze_quality(
        &self,
        reference: &str,
        distorted: &str,
        output: &str,
        model: QualityModel,
    ) -> Result<Option<String>> {
        let reference = self.local_reference(reference);
        self.analyzer.analyze_quality(reference, distorted, output, model).await
    }

    fn variant_location(&self, output: &str) -> String {
        output.to_string()
    }

    /// The instance reads the reference by URL; scoring needs a local copy
    /// at `<job>/reference.<ext>`.
    async fn prepare_reference(&self, reference: &str, job_name: &str) -> Result<String> {
        if !reference.contains("://") {
            return Err(ExecError::Config(format!(
                "encore reads its input by URL; `{reference}` is a local path"
            )));
        }
        let extension = Path::new(basename(reference))
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let local = join(job_name, &format!("reference.{extension}"));
        if self.store.exists(&local).await? {
            debug!(local, "reference already downloaded");
        } else {
            tokio::fs::create_dir_all(job_name).await?;
            let partial = partial_location(&local);
            self.api.download(reference, Path::new(&partial)).await?;
            tokio::fs::rename(&partial, &local).await?;
            info!(reference, local, "reference downloaded");
        }
        let _ = self.reference.set((reference.to_string(), local));
        Ok(reference.to_string())
    }

    fn artifact_store(&self) -> Arc<dyn ArtifactStore> {
        self.store.clone()
    }

    async fn finish(&self) -> Result<()> {
        if let Some(instance) = self.instance.get() {
            self.api.delete_instance(instance).await?;
            info!(instance = %instance.name, "encore instance deleted");
        }
        Ok(())
    }
}
