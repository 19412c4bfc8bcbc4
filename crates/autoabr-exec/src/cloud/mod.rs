//! Cloud backend: S3 artifacts, batch transcode jobs, container analysis tasks.
//!
//! Layout in the output bucket:
//! - `encoded-files/<job>/<stem>.mp4` plus `<stem>_metadata.json`
//! - `results/<job>/<model>/<stem>_vmaf.json` plus `<stem>_metadata.json`
//!
//! Transcode jobs are polled through the job service until a terminal state.
//! Analysis tasks cannot be queried, so completion is detected by polling for
//! the result object.

#[cfg(feature = "s3")]
pub mod aws;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoabr_core::config::{CloudBackendConfig, EngineConfig};
use autoabr_core::naming::{basename, dirname, join, metadata_location, strip_extension};
use autoabr_core::{QualityModel, Resolution, Variables};
use autoabr_io::uri::{is_s3_uri, s3_uri};
use autoabr_io::ArtifactStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn, Instrument};

use crate::backend::ExecutionBackend;
use crate::error::{ExecError, Result};
use crate::metrics;
use crate::probe::probe;
use crate::process::CommandRunner;
use crate::template::{EncodeTemplate, TemplateParams};

#[cfg(feature = "s3")]
pub use aws::AwsServices;

pub const ENCODED_PREFIX: &str = "encoded-files";
pub const RESULTS_PREFIX: &str = "results";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Progressing,
    Complete,
    Error,
    Canceled,
}

impl JobStatus {
    /// Service status string; anything unrecognised counts as still running.
    pub fn from_service(status: &str) -> Self {
        match status {
            "SUBMITTED" => JobStatus::Submitted,
            "COMPLETE" => JobStatus::Complete,
            "ERROR" => JobStatus::Error,
            "CANCELED" => JobStatus::Canceled,
            _ => JobStatus::Progressing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error | JobStatus::Canceled)
    }
}

/// A rendered transcode job ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    pub role: String,
    pub settings: Value,
    pub acceleration_mode: Option<String>,
}

#[async_trait]
pub trait BatchTranscoder: Send + Sync {
    /// Returns the job id.
    async fn submit(&self, request: &TranscodeRequest) -> Result<String>;

    async fn status(&self, job_id: &str) -> Result<JobStatus>;
}

/// A one-shot analysis container run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisTask {
    pub cluster: String,
    pub task_definition: String,
    pub container_name: String,
    pub subnet: String,
    pub security_group: String,
    pub command: Vec<String>,
    pub tags: Vec<(String, String)>,
}

#[async_trait]
pub trait TaskLauncher: Send + Sync {
    async fn launch(&self, task: &AnalysisTask) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub job_poll: Duration,
    pub result_poll: Duration,
    pub max_wait: Duration,
}

impl From<&EngineConfig> for PollTiming {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            job_poll: Duration::from_millis(cfg.job_poll_interval_ms),
            result_poll: Duration::from_millis(cfg.result_poll_interval_ms),
            max_wait: Duration::from_secs(cfg.max_wait_secs),
        }
    }
}

/// Everything the cloud backend talks to.
pub struct CloudServices {
    pub input_store: Arc<dyn ArtifactStore>,
    pub output_store: Arc<dyn ArtifactStore>,
    pub transcoder: Arc<dyn BatchTranscoder>,
    pub launcher: Arc<dyn TaskLauncher>,
    /// Runs ffprobe on downloaded variants.
    pub runner: Arc<dyn CommandRunner>,
}

pub struct CloudBackend {
    cfg: CloudBackendConfig,
    template: EncodeTemplate,
    services: CloudServices,
    timing: PollTiming,
}

/// Replace characters the tagging API rejects with `_`.
pub fn cleanup_tag_value(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || " _.:/=+-@".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Key part of an `s3://bucket/key` URI; other locations are returned as-is.
pub fn object_key(location: &str) -> &str {
    location
        .strip_prefix("s3://")
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, key)| key)
        .unwrap_or(location)
}

fn bucket_of(location: &str) -> Option<&str> {
    location
        .strip_prefix("s3://")
        .map(|rest| rest.split_once('/').map(|(bucket, _)| bucket).unwrap_or(rest))
}

fn model_arguments(model: QualityModel) -> Vec<String> {
    let mut args = vec!["--model".to_string(), model.tool_model().to_string()];
    if model.phone() {
        args.push("--phone".to_string());
    }
    args
}

/// Stream `source` into `store` at `target_dir/target_name` unless already there.
///
/// Remote sources pass through untouched. Returns the canonical URI.
pub async fn upload_if_needed(
    source: &str,
    store: &dyn ArtifactStore,
    target_dir: &str,
    target_name: Option<&str>,
) -> Result<String> {
    if is_s3_uri(source) {
        return Ok(source.to_string());
    }
    let key = join(target_dir, target_name.unwrap_or_else(|| basename(source)));
    if store.exists(&key).await? {
        debug!(source, key, "already uploaded");
    } else {
        info!(source, key, "uploading");
        store.upload_file(Path::new(source), &key).await?;
    }
    Ok(store.uri_for(&key))
}

impl CloudBackend {
    pub fn new(
        cfg: CloudBackendConfig,
        encoding_profile: &Value,
        services: CloudServices,
        timing: PollTiming,
    ) -> Result<Self> {
        cfg.validate().map_err(|e| ExecError::Config(e.to_string()))?;
        Ok(Self {
            template: EncodeTemplate::from_value(encoding_profile)?,
            cfg,
            services,
            timing,
        })
    }

    /// S3 stores for both buckets and SDK clients for MediaConvert and ECS.
    #[cfg(feature = "s3")]
    pub async fn from_config(cfg: CloudBackendConfig, encoding_profile: &Value, engine: &EngineConfig) -> Result<Self> {
        use autoabr_io::CloudStore;

        cfg.validate().map_err(|e| ExecError::Config(e.to_string()))?;
        let storage = engine.storage_config();
        let input_store: Arc<dyn ArtifactStore> = Arc::new(CloudStore::s3(&cfg.input_bucket, &storage)?);
        let output_store: Arc<dyn ArtifactStore> = Arc::new(CloudStore::s3(&cfg.output_bucket, &storage)?);
        let aws = Arc::new(AwsServices::load(engine.aws_region.as_deref(), &cfg.media_convert_endpoint).await);
        let services = CloudServices {
            input_store,
            output_store,
            transcoder: aws.clone(),
            launcher: aws,
            runner: Arc::new(crate::process::TokioRunner),
        };
        Self::new(cfg, encoding_profile, services, PollTiming::from(engine))
    }

    #[cfg(not(feature = "s3"))]
    pub async fn from_config(_cfg: CloudBackendConfig, _encoding_profile: &Value, _engine: &EngineConfig) -> Result<Self> {
        Err(ExecError::Config(
            "the aws pipeline needs the `s3` feature; rebuild with `--features s3`".into(),
        ))
    }

    fn output_uri(&self, key: &str) -> String {
        s3_uri(&self.cfg.output_bucket, key)
    }

    /// Poll until the job reaches a terminal state. `None` on timeout or when
    /// the status cannot be fetched.
    async fn await_job(&self, job_id: &str) -> Option<JobStatus> {
        let deadline = Instant::now() + self.timing.max_wait;
        loop {
            match self.services.transcoder.status(job_id).await {
                Ok(status) if status.is_terminal() => return Some(status),
                Ok(status) => debug!(job_id, ?status, "job running"),
                Err(e) => {
                    error!(job_id, error = %e, "could not fetch job status");
                    return None;
                }
            }
            if Instant::now() >= deadline {
                warn!(job_id, "job did not finish within the wait ceiling");
                return None;
            }
            sleep(self.timing.job_poll).await;
        }
    }

    /// Poll for `key` in the output bucket; false on timeout.
    async fn wait_for_object(&self, key: &str) -> bool {
        let deadline = Instant::now() + self.timing.max_wait;
        loop {
            match self.services.output_store.exists(key).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(key, error = %e, "existence check failed"),
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(self.timing.result_poll).await;
        }
    }

    /// Probe the variant at `variant_key` and store its sidecar, unless present.
    async fn ensure_variant_metadata(&self, variant_key: &str) {
        let sidecar = metadata_location(variant_key);
        let store = &self.services.output_store;
        if matches!(store.exists(&sidecar).await, Ok(true)) {
            return;
        }
        let written = async {
            let scratch = tempfile::Builder::new().suffix(".mp4").tempfile()?;
            store.download_file(variant_key, scratch.path()).await?;
            let target = scratch.path().display().to_string();
            let probed = probe(&*self.services.runner, &self.cfg.ffprobe_path, &target).await?;
            let bytes = serde_json::to_vec_pretty(&probed).map_err(|e| ExecError::Config(e.to_string()))?;
            store.write(&sidecar, bytes).await?;
            Ok::<_, ExecError>(())
        };
        if let Err(e) = written.await {
            warn!(variant_key, error = %e, "variant metadata not written");
        }
    }

    /// Copy the distorted variant's sidecar next to the result at `result_key`.
    async fn copy_metadata(&self, distorted: &str, result_key: &str) {
        let target = metadata_location(result_key);
        let store = &self.services.output_store;
        if matches!(store.exists(&target).await, Ok(true)) {
            return;
        }
        if bucket_of(distorted).is_some_and(|b| b != self.cfg.output_bucket) {
            debug!(distorted, "variant lives outside the output bucket; no metadata to copy");
            return;
        }
        let source = metadata_location(object_key(distorted));
        if let Err(e) = store.copy(&source, &target).await {
            warn!(source, target, error = %e, "metadata sidecar not copied");
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
        let object = object_key(output);
        let output_key = join(ENCODED_PREFIX, object);
        let output_uri = self.output_uri(&output_key);

        if self.services.output_store.exists(&output_key).await? {
            info!(uri = %output_uri, "variant exists, skipping transcode job");
            self.ensure_variant_metadata(&output_key).await;
            return Ok(Some(output_uri));
        }

        let input_uri = upload_if_needed(input, &*self.services.input_store, dirname(object), None).await?;
        let settings = self.template.render(&TemplateParams {
            input: &input_uri,
            output: strip_extension(&output_uri),
            resolution,
            bitrate,
            variables,
        })?;
        let request = TranscodeRequest {
            role: self.cfg.media_convert_role.clone(),
            settings,
            acceleration_mode: self.cfg.acceleration_mode.clone(),
        };

        let job_id = self.services.transcoder.submit(&request).await?;
        info!(job_id, uri = %output_uri, "transcode job submitted");

        match self.await_job(&job_id).await {
            Some(JobStatus::Complete) => {
                info!(job_id, "transcode job complete");
                self.ensure_variant_metadata(&output_key).await;
                Ok(Some(output_uri))
            }
            Some(status) => {
                error!(job_id, ?status, "transcode job failed");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn run_analysis(
        &self,
        reference: &str,
        distorted: &str,
        output: &str,
        model: QualityModel,
    ) -> Result<Option<String>> {
        let object = object_key(output);
        let output_key = join(RESULTS_PREFIX, object);
        let output_uri = self.output_uri(&output_key);

        if self.services.output_store.exists(&output_key).await? {
            info!(uri = %output_uri, "quality result exists, skipping analysis task");
            self.copy_metadata(distorted, &output_key).await;
            return Ok(Some(output_uri));
        }

        let store = &*self.services.output_store;
        let reference_uri = upload_if_needed(reference, store, dirname(object), None).await?;
        let distorted_uri = upload_if_needed(distorted, store, dirname(object), None).await?;

        let mut command = vec![
            "-r".to_string(),
            reference_uri.clone(),
            "-d".to_string(),
            distorted_uri.clone(),
            "-o".to_string(),
            output_uri.clone(),
        ];
        command.extend(model_arguments(model));

        let task = AnalysisTask {
            cluster: self.cfg.ecs_cluster.clone(),
            task_definition: self.cfg.ecs_task_definition.clone(),
            container_name: self.cfg.ecs_container_name.clone(),
            subnet: self.cfg.ecs_subnet.clone(),
            security_group: self.cfg.ecs_security_group.clone(),
            command,
            tags: vec![
                ("ReferenceFile".to_string(), cleanup_tag_value(&reference_uri)),
                ("Output".to_string(), cleanup_tag_value(object)),
            ],
        };
        self.services.launcher.launch(&task).await?;
        info!(uri = %output_uri, "analysis task launched");

        if !self.wait_for_object(&output_key).await {
            error!(uri = %output_uri, "analysis result did not appear within the wait ceiling");
            return Ok(None);
        }
        self.copy_metadata(&distorted_uri, &output_key).await;
        Ok(Some(output_uri))
    }
}

#[async_trait]
impl ExecutionBackend for CloudBackend {
    fn name(&self) -> &'static str {
        "aws"
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
        self.run_analysis(reference, distorted, output, model)
            .instrument(metrics::quality_span(model, output))
            .await
    }

    fn variant_location(&self, output: &str) -> String {
        self.output_uri(&join(ENCODED_PREFIX, object_key(output)))
    }

    async fn prepare_reference(&self, reference: &str, job_name: &str) -> Result<String> {
        let extension = Path::new(basename(reference))
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let name = format!("reference.{extension}");
        upload_if_needed(reference, &*self.services.input_store, job_name, Some(&name)).await
    }

    fn artifact_store(&self) -> Arc<dyn ArtifactStore> {
        self.services.output_store.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedRunner, VMAF_JSON};
    use autoabr_io::{CloudStore, RetryConfig};
    use object_store::memory::InMemory;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn bucket(name: &str) -> Arc<dyn ArtifactStore> {
        Arc::new(CloudStore::new(Arc::new(InMemory::new()), name, RetryConfig::default()))
    }

    fn config() -> CloudBackendConfig {
        CloudBackendConfig {
            input_bucket: "in".into(),
            output_bucket: "out".into(),
            media_convert_role: "arn:aws:iam::1:role/mc".into(),
            media_convert_endpoint: "https://mc.example".into(),
            ecs_subnet: "subnet-1".into(),
            ecs_security_group: "sg-1".into(),
            ecs_cluster: "vmaf".into(),
            ecs_container_name: "easyvmaf".into(),
            ecs_task_definition: "easyvmaf:3".into(),
            acceleration_mode: None,
            ffprobe_path: "ffprobe".into(),
        }
    }

    fn timing() -> PollTiming {
        PollTiming {
            job_poll: Duration::from_millis(1),
            result_poll: Duration::from_millis(1),
            max_wait: Duration::from_millis(50),
        }
    }

    /// Writes `produce` into the output bucket on submit and replays `statuses`.
    struct FakeTranscoder {
        store: Arc<dyn ArtifactStore>,
        produce: Option<String>,
        statuses: Mutex<VecDeque<JobStatus>>,
        submitted: Mutex<Vec<TranscodeRequest>>,
    }

    impl FakeTranscoder {
        fn new(store: Arc<dyn ArtifactStore>, produce: Option<&str>, statuses: &[JobStatus]) -> Self {
            Self {
                store,
                produce: produce.map(str::to_string),
                statuses: Mutex::new(statuses.iter().copied().collect()),
                submitted: Mutex::default(),
            }
        }

        fn submissions(&self) -> usize {
            self.submitted.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BatchTranscoder for FakeTranscoder {
        async fn submit(&self, request: &TranscodeRequest) -> Result<String> {
            self.submitted.lock().unwrap().push(request.clone());
            if let Some(key) = &self.produce {
                self.store.write(key, b"variant".to_vec()).await?;
            }
            Ok("job-1".into())
        }

        async fn status(&self, _job_id: &str) -> Result<JobStatus> {
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ExecError::JobService("no more statuses".into()))
        }
    }

    struct FakeLauncher {
        store: Arc<dyn ArtifactStore>,
        produce: Option<String>,
        launches: AtomicUsize,
        last: Mutex<Option<AnalysisTask>>,
    }

    impl FakeLauncher {
        fn new(store: Arc<dyn ArtifactStore>, produce: Option<&str>) -> Self {
            Self {
                store,
                produce: produce.map(str::to_string),
                launches: AtomicUsize::new(0),
                last: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl TaskLauncher for FakeLauncher {
        async fn launch(&self, task: &AnalysisTask) -> Result<()> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(task.clone());
            if let Some(key) = &self.produce {
                self.store.write(key, VMAF_JSON.as_bytes().to_vec()).await?;
            }
            Ok(())
        }
    }

    struct Harness {
        backend: CloudBackend,
        input: Arc<dyn ArtifactStore>,
        output: Arc<dyn ArtifactStore>,
        transcoder: Arc<FakeTranscoder>,
        launcher: Arc<FakeLauncher>,
        runner: Arc<ScriptedRunner>,
    }

    fn harness(produce_variant: bool, statuses: &[JobStatus], produce_result: bool) -> Harness {
        let input = bucket("in");
        let output = bucket("out");
        let transcoder = Arc::new(FakeTranscoder::new(
            output.clone(),
            produce_variant.then_some("encoded-files/job/1280x720_500000.mp4"),
            statuses,
        ));
        let launcher = Arc::new(FakeLauncher::new(
            output.clone(),
            produce_result.then_some("results/job/HD/1280x720_500000_vmaf.json"),
        ));
        let runner = Arc::new(ScriptedRunner::default());
        let services = CloudServices {
            input_store: input.clone(),
            output_store: output.clone(),
            transcoder: transcoder.clone(),
            launcher: launcher.clone(),
            runner: runner.clone(),
        };
        let profile = json!({
            "Inputs": [{"FileInput": "${INPUT}"}],
            "OutputGroups": [{"Destination": "${OUTPUT}", "Width": "${WIDTH}", "Bitrate": "${BITRATE}"}]
        });
        let backend = CloudBackend::new(config(), &profile, services, timing()).unwrap();
        Harness {
            backend,
            input,
            output,
            transcoder,
            launcher,
            runner,
        }
    }

    const REFERENCE: &str = "s3://in/job/reference.mp4";

    #[test]
    fn tag_values_are_sanitised() {
        assert_eq!(cleanup_tag_value("s3://b/job/a b+c=d@e"), "s3://b/job/a b+c=d@e");
        assert_eq!(cleanup_tag_value("job/é#1,2"), "job/__1_2");
    }

    #[test]
    fn object_keys() {
        assert_eq!(object_key("s3://out/results/job/a.json"), "results/job/a.json");
        assert_eq!(object_key("job/a.mp4"), "job/a.mp4");
        assert_eq!(bucket_of("s3://out/x"), Some("out"));
        assert_eq!(bucket_of("job/x"), None);
    }

    #[test]
    fn incomplete_config_is_rejected() {
        let mut cfg = config();
        cfg.ecs_cluster.clear();
        let h = harness(false, &[], false);
        let err = CloudBackend::new(cfg, &json!({}), h.backend.services, timing());
        assert!(matches!(err, Err(ExecError::Config(_))));
    }

    #[tokio::test]
    async fn transcode_polls_to_completion_then_hits_cache() {
        let h = harness(true, &[JobStatus::Submitted, JobStatus::Progressing, JobStatus::Complete], false);
        let res = Resolution::new(1280, 720);

        let uri = h
            .backend
            .transcode(REFERENCE, res, 500_000, "job/1280x720_500000.mp4", &Variables::new())
            .await
            .unwrap();
        assert_eq!(uri.as_deref(), Some("s3://out/encoded-files/job/1280x720_500000.mp4"));
        assert_eq!(h.transcoder.submissions(), 1);
        assert!(h.output.exists("encoded-files/job/1280x720_500000_metadata.json").await.unwrap());

        let request = h.transcoder.submitted.lock().unwrap()[0].clone();
        assert_eq!(request.settings["Inputs"][0]["FileInput"], REFERENCE);
        assert_eq!(request.settings["OutputGroups"][0]["Destination"], "s3://out/encoded-files/job/1280x720_500000");
        assert_eq!(request.settings["OutputGroups"][0]["Width"], 1280);
        assert_eq!(request.settings["OutputGroups"][0]["Bitrate"], 500_000);

        let again = h
            .backend
            .transcode(REFERENCE, res, 500_000, "job/1280x720_500000.mp4", &Variables::new())
            .await
            .unwrap();
        assert_eq!(again, uri);
        assert_eq!(h.transcoder.submissions(), 1);
        assert_eq!(h.runner.calls_to("ffprobe"), 1);
    }

    #[tokio::test]
    async fn failed_or_unknown_jobs_yield_no_variant() {
        let h = harness(false, &[JobStatus::Progressing, JobStatus::Error], false);
        let got = h
            .backend
            .transcode(REFERENCE, Resolution::new(640, 360), 300_000, "job/640x360_300000.mp4", &Variables::new())
            .await
            .unwrap();
        assert_eq!(got, None);

        // Status queue runs dry: the fetch fails and the pair is given up.
        let h = harness(false, &[JobStatus::Progressing], false);
        let got = h
            .backend
            .transcode(REFERENCE, Resolution::new(640, 360), 300_000, "job/640x360_300000.mp4", &Variables::new())
            .await
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn analysis_launches_task_and_copies_metadata() {
        let h = harness(false, &[], true);
        h.output
            .write("encoded-files/job/1280x720_500000_metadata.json", b"{}".to_vec())
            .await
            .unwrap();
        let distorted = "s3://out/encoded-files/job/1280x720_500000.mp4";

        let uri = h
            .backend
            .analyze_quality(REFERENCE, distorted, "job/HD/1280x720_500000_vmaf.json", QualityModel::PhoneHd)
            .await
            .unwrap();
        assert_eq!(uri.as_deref(), Some("s3://out/results/job/HD/1280x720_500000_vmaf.json"));
        assert!(h.output.exists("results/job/HD/1280x720_500000_metadata.json").await.unwrap());

        let task = h.launcher.last.lock().unwrap().clone().unwrap();
        assert_eq!(
            task.command,
            [
                "-r",
                REFERENCE,
                "-d",
                distorted,
                "-o",
                "s3://out/results/job/HD/1280x720_500000_vmaf.json",
                "--model",
                "HD",
                "--phone"
            ]
        );
        assert_eq!(task.tags[1], ("Output".to_string(), "job/HD/1280x720_500000_vmaf.json".to_string()));

        h.backend
            .analyze_quality(REFERENCE, distorted, "job/HD/1280x720_500000_vmaf.json", QualityModel::PhoneHd)
            .await
            .unwrap();
        assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn analysis_times_out_without_result() {
        let h = harness(false, &[], false);
        let got = h
            .backend
            .analyze_quality(
                REFERENCE,
                "s3://out/encoded-files/job/1280x720_500000.mp4",
                "job/HD/1280x720_500000_vmaf.json",
                QualityModel::Hd,
            )
            .await
            .unwrap();
        assert_eq!(got, None);
        assert_eq!(h.launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reference_is_uploaded_once() {
        let h = harness(false, &[], false);
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("sintel.mov");
        std::fs::write(&local, b"reference").unwrap();
        let local = local.display().to_string();

        let uri = h.backend.prepare_reference(&local, "job").await.unwrap();
        assert_eq!(uri, "s3://in/job/reference.mov");
        assert_eq!(h.input.read("job/reference.mov").await.unwrap(), b"reference");

        std::fs::remove_file(&local).unwrap();
        assert_eq!(h.backend.prepare_reference(&local, "job").await.unwrap(), uri);
        assert_eq!(h.backend.prepare_reference(REFERENCE, "job").await.unwrap(), REFERENCE);
    }

    #[cfg(not(feature = "s3"))]
    #[tokio::test]
    async fn aws_pipeline_requires_the_s3_feature() {
        let err = CloudBackend::from_config(config(), &json!({}), &EngineConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::Config(ref m) if m.contains("`s3` feature")));
    }
}
