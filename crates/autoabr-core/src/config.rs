//! Engine and backend configuration that downstream crates can serialize/deserialize.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on pairs in flight when concurrency is enabled (None = all at once).
    pub max_parallel_pairs: Option<usize>,

    /// Interval between batch-transcode job status polls.
    pub job_poll_interval_ms: u64,

    /// Ceiling on any single wait (job polling or result existence).
    pub max_wait_secs: u64,

    /// Interval between result-existence checks for container analysis tasks.
    pub result_poll_interval_ms: u64,

    /// Retry policy for artifact storage.
    pub retry_max_retries: usize,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,

    pub aws_region: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_pairs: None,
            job_poll_interval_ms: 10_000,
            max_wait_secs: 8 * 60 * 60,
            result_poll_interval_ms: 5_000,
            retry_max_retries: 3,
            retry_initial_backoff_ms: 200,
            retry_max_backoff_ms: 5_000,
            aws_region: None,
        }
    }
}

/// Snapshot of storage settings consumed by the IO layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub aws_region: Option<String>,
    pub retry_max_retries: usize,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `AUTOABR_MAX_PARALLEL_PAIRS`: bound on concurrent pairs
    /// - `AUTOABR_JOB_POLL_INTERVAL_MS`: transcode job poll interval
    /// - `AUTOABR_MAX_WAIT_SECS`: wait ceiling
    /// - `AUTOABR_RESULT_POLL_INTERVAL_MS`: analysis result poll interval
    /// - `AUTOABR_RETRY_MAX_RETRIES`, `AUTOABR_RETRY_INITIAL_MS`, `AUTOABR_RETRY_MAX_MS`
    /// - `AUTOABR_AWS_REGION`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("AUTOABR_MAX_PARALLEL_PAIRS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_parallel_pairs = Some(v.max(1));
            }
        }

        if let Ok(s) = std::env::var("AUTOABR_JOB_POLL_INTERVAL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.job_poll_interval_ms = v;
            }
        }

        if let Ok(s) = std::env::var("AUTOABR_MAX_WAIT_SECS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.max_wait_secs = v;
            }
        }

        if let Ok(s) = std::env::var("AUTOABR_RESULT_POLL_INTERVAL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.result_poll_interval_ms = v;
            }
        }

        if let Ok(s) = std::env::var("AUTOABR_RETRY_MAX_RETRIES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.retry_max_retries = v;
            }
        }

        if let Ok(s) = std::env::var("AUTOABR_RETRY_INITIAL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.retry_initial_backoff_ms = v;
            }
        }

        if let Ok(s) = std::env::var("AUTOABR_RETRY_MAX_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.retry_max_backoff_ms = v;
            }
        }

        if let Ok(s) = std::env::var("AUTOABR_AWS_REGION") {
            cfg.aws_region = Some(s);
        }

        cfg
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            aws_region: self.aws_region.clone(),
            retry_max_retries: self.retry_max_retries,
            retry_initial_backoff_ms: self.retry_initial_backoff_ms,
            retry_max_backoff_ms: self.retry_max_backoff_ms,
        }
    }
}

/// Execution backend selection, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfig {
    Local(LocalBackendConfig),
    #[serde(rename = "aws")]
    Cloud(CloudBackendConfig),
    Encore(EncoreBackendConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Local(_) => "local",
            BackendConfig::Cloud(_) => "aws",
            BackendConfig::Encore(_) => "encore",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalBackendConfig {
    pub ffmpeg_path: PathBuf,
    /// Defaults to `ffprobe` next to `ffmpeg_path`.
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    pub python_path: PathBuf,
    pub easy_vmaf_path: PathBuf,
    pub ffmpeg_encoder: String,
    #[serde(default)]
    pub only_one_pass: bool,
    /// Omit the `-b:v/-maxrate/-bufsize` defaults and rely on the encoding profile.
    #[serde(default)]
    pub skip_default_options: bool,
}

impl LocalBackendConfig {
    /// Tool paths for scoring only; the encoder fields stay at their defaults.
    pub fn for_analysis(python_path: PathBuf, easy_vmaf_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path: ffprobe_path.with_file_name("ffmpeg"),
            ffprobe_path: Some(ffprobe_path),
            python_path,
            easy_vmaf_path,
            ffmpeg_encoder: String::new(),
            only_one_pass: false,
            skip_default_options: false,
        }
    }

    pub fn ffprobe(&self) -> PathBuf {
        match &self.ffprobe_path {
            Some(p) => p.clone(),
            None => self.ffmpeg_path.with_file_name("ffprobe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudBackendConfig {
    pub input_bucket: String,
    pub output_bucket: String,
    pub media_convert_role: String,
    pub media_convert_endpoint: String,
    pub ecs_subnet: String,
    pub ecs_security_group: String,
    pub ecs_cluster: String,
    pub ecs_container_name: String,
    pub ecs_task_definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_mode: Option<String>,
    /// ffprobe used to probe finished variants for metadata sidecars.
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl CloudBackendConfig {
    /// Required fields must be non-empty; reported before any work starts.
    pub fn validate(&self) -> crate::Result<()> {
        let required = [
            ("inputBucket", &self.input_bucket),
            ("outputBucket", &self.output_bucket),
            ("mediaConvertRole", &self.media_convert_role),
            ("mediaConvertEndpoint", &self.media_convert_endpoint),
            ("ecsCluster", &self.ecs_cluster),
            ("ecsContainerName", &self.ecs_container_name),
            ("ecsTaskDefinition", &self.ecs_task_definition),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(crate::Error::Config(format!("aws pipeline is missing `{name}`")));
            }
        }
        Ok(())
    }
}

/// An Encore transcoding service reached over its REST API.
///
/// Variants are downloaded into the job directory and scored locally with
/// easyVmaf, so the analysis tool paths are part of this profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncoreBackendConfig {
    pub api_address: String,
    pub token: String,
    pub instance_id: String,
    pub profiles_url: String,
    #[serde(default = "default_encore_output_folder")]
    pub output_folder: String,
    #[serde(default = "default_encore_priority")]
    pub priority: u32,
    /// Seconds of input to transcode; the whole input when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(rename = "encorePollingInterval_ms", default = "default_encore_poll_ms")]
    pub polling_interval_ms: u64,
    #[serde(rename = "encoreInstancePostCreationDelay_ms", default)]
    pub post_creation_delay_ms: u64,
    pub python_path: PathBuf,
    pub easy_vmaf_path: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,
}

fn default_encore_output_folder() -> String {
    "/usercontent/autoabr".to_string()
}

fn default_encore_priority() -> u32 {
    100
}

fn default_encore_poll_ms() -> u64 {
    30_000
}

impl EncoreBackendConfig {
    pub fn validate(&self) -> crate::Result<()> {
        let required = [
            ("apiAddress", &self.api_address),
            ("token", &self.token),
            ("instanceId", &self.instance_id),
            ("profilesUrl", &self.profiles_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(crate::Error::Config(format!("encore pipeline is missing `{name}`")));
            }
        }
        if self.polling_interval_ms == 0 {
            return Err(crate::Error::Config("`encorePollingInterval_ms` must be positive".into()));
        }
        Ok(())
    }

    pub fn analysis_tools(&self) -> LocalBackendConfig {
        LocalBackendConfig::for_analysis(
            self.python_path.clone(),
            self.easy_vmaf_path.clone(),
            self.ffprobe_path.clone(),
        )
    }
}
