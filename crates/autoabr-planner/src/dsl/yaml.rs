//! YAML job descriptions.
//!
//! Example:
//! ```yaml
//! name: sintel
//! pipeline: pipeline.yml          # or an inline local pipeline mapping
//! encodingProfile: profile.json   # or an inline {option: value} mapping
//! reference: media/sintel.mp4
//! models: [HD, PhoneHD]
//! resolutions:
//!   - 1280x720
//!   - { width: 1920, height: 1080, range: { min: 2000000 } }
//! bitrates: [1000000, 2000000, 4000000]
//! pipelineVariables:
//!   PRESET: [slow, veryfast]
//! ```
//!
//! Pipeline profile:
//! ```yaml
//! local:
//!   ffmpegPath: /usr/bin/ffmpeg
//!   pythonPath: python3
//!   easyVmafPath: /opt/easyVmaf/easyVmaf.py
//!   ffmpegEncoder: libx264
//! ```
//!
//! The `aws` and `encore` keys select the other backends; with `encore` the
//! encoding profile is an Encore profile with an `encodes` list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use autoabr_core::config::{BackendConfig, CloudBackendConfig, EncoreBackendConfig, LocalBackendConfig};
use autoabr_core::naming::check_variable;
use autoabr_core::{QualityModel, Resolution, ResolutionTarget};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::search::{PairFilter, SearchSpace, DEFAULT_BITRATES, DEFAULT_RESOLUTIONS};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    /// Names the artifact directory.
    pub name: String,
    pub pipeline: PipelineRef,
    #[serde(default)]
    pub encoding_profile: Option<EncodingProfileRef>,
    pub reference: String,
    #[serde(default)]
    pub models: Option<Vec<QualityModel>>,
    #[serde(default)]
    pub resolutions: Option<Vec<ResolutionEntry>>,
    #[serde(default)]
    pub bitrates: Option<Vec<u64>>,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub pipeline_variables: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub skip_transcode: bool,
    #[serde(default)]
    pub concurrency: Option<bool>,
    #[serde(default)]
    pub include_all_bitrates: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    #[default]
    BruteForce,
    WalkTheHull,
}

/// A path to a pipeline profile, an inline local pipeline, or an inline profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineRef {
    Path(String),
    InlineLocal(LocalBackendConfig),
    Profile(PipelineProfile),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncodingProfileRef {
    Path(String),
    Inline(Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolutionEntry {
    Text(String),
    Target(ResolutionTarget),
}

impl ResolutionEntry {
    fn to_target(&self) -> Result<ResolutionTarget> {
        match self {
            ResolutionEntry::Text(s) => Ok(s.parse::<Resolution>()?.into()),
            ResolutionEntry::Target(t) => Ok(*t),
        }
    }
}

/// Pipeline profile document, tagged by the `aws`, `encore` or `local` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineProfile {
    #[serde(default)]
    pub aws: Option<AwsProfile>,
    #[serde(default)]
    pub encore: Option<EncoreBackendConfig>,
    #[serde(default)]
    pub local: Option<LocalBackendConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsProfile {
    /// Legacy single-bucket key; fills both buckets when they are absent.
    pub s3_bucket: Option<String>,
    pub input_bucket: Option<String>,
    pub output_bucket: Option<String>,
    pub media_convert_role: Option<String>,
    pub media_convert_endpoint: Option<String>,
    pub ecs_subnet: Option<String>,
    pub ecs_security_group: Option<String>,
    pub ecs_cluster: Option<String>,
    pub ecs_container_name: Option<String>,
    pub ecs_task_definition: Option<String>,
    pub acceleration_mode: Option<String>,
    pub ffprobe_path: Option<PathBuf>,
}

impl AwsProfile {
    fn into_config(self) -> Result<CloudBackendConfig> {
        let bucket = |b: Option<String>, which: &str| {
            b.or_else(|| self.s3_bucket.clone())
                .ok_or_else(|| Error::Invalid(format!("aws pipeline needs `{which}` (or `s3Bucket`)")))
        };
        let input_bucket = bucket(self.input_bucket.clone(), "inputBucket")?;
        let output_bucket = bucket(self.output_bucket.clone(), "outputBucket")?;
        let cfg = CloudBackendConfig {
            input_bucket,
            output_bucket,
            media_convert_role: self.media_convert_role.unwrap_or_default(),
            media_convert_endpoint: self.media_convert_endpoint.unwrap_or_default(),
            ecs_subnet: self.ecs_subnet.unwrap_or_default(),
            ecs_security_group: self.ecs_security_group.unwrap_or_default(),
            ecs_cluster: self.ecs_cluster.unwrap_or_default(),
            ecs_container_name: self.ecs_container_name.unwrap_or_default(),
            ecs_task_definition: self.ecs_task_definition.unwrap_or_default(),
            acceleration_mode: self.acceleration_mode,
            ffprobe_path: self.ffprobe_path.unwrap_or_else(|| PathBuf::from("ffprobe")),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

impl PipelineProfile {
    pub fn into_backend(self) -> Result<BackendConfig> {
        match (self.aws, self.encore, self.local) {
            (Some(aws), _, _) => Ok(BackendConfig::Cloud(aws.into_config()?)),
            (None, Some(encore), _) => {
                encore.validate()?;
                Ok(BackendConfig::Encore(encore))
            }
            (None, None, Some(local)) => Ok(BackendConfig::Local(local)),
            (None, None, None) => Err(Error::Invalid("pipeline defines none of `aws`, `encore` or `local`".into())),
        }
    }
}

/// Everything needed to run a job, with defaults applied and paths resolved.
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    pub name: String,
    pub reference: String,
    pub backend: BackendConfig,
    pub encoding_profile: Value,
    pub models: Vec<QualityModel>,
    pub search: SearchSpace,
    pub concurrency: bool,
    pub skip_transcode: bool,
    pub include_all_bitrates: bool,
}

pub fn parse_job_yaml(src: &str) -> Result<JobDescription> {
    let job: JobDescription = serde_yaml::from_str(src)?;
    if job.name.trim().is_empty() {
        return Err(Error::Invalid("`name` must not be empty".into()));
    }
    if job.reference.trim().is_empty() {
        return Err(Error::Invalid("`reference` must not be empty".into()));
    }
    Ok(job)
}

pub fn parse_pipeline_yaml(src: &str) -> Result<BackendConfig> {
    let profile: PipelineProfile = serde_yaml::from_str(src)?;
    profile.into_backend()
}

/// Read and resolve a job file; relative paths inside it are resolved against its directory.
pub fn load_job_file(path: &Path) -> Result<ResolvedJob> {
    let src = read(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    parse_job_yaml(&src)?.resolve(base)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let candidate = Path::new(p);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

impl JobDescription {
    pub fn models(&self) -> Vec<QualityModel> {
        match &self.models {
            Some(m) if !m.is_empty() => m.clone(),
            _ => vec![QualityModel::Hd],
        }
    }

    /// Explicit resolutions and bitrates together disable the default filter.
    pub fn search_space(&self) -> Result<SearchSpace> {
        let resolutions = match &self.resolutions {
            Some(entries) => entries.iter().map(ResolutionEntry::to_target).collect::<Result<Vec<_>>>()?,
            None => DEFAULT_RESOLUTIONS.iter().copied().map(ResolutionTarget::from).collect(),
        };
        let bitrates = self.bitrates.clone().unwrap_or_else(|| DEFAULT_BITRATES.to_vec());
        let filter = if self.resolutions.is_some() && self.bitrates.is_some() {
            PairFilter::AcceptAll
        } else {
            PairFilter::default()
        };
        Ok(SearchSpace::new(resolutions, bitrates)
            .with_filter(filter)
            .with_variables(self.pipeline_variables()?))
    }

    /// Variables whose names and values can be carried in artifact names.
    pub fn pipeline_variables(&self) -> Result<BTreeMap<String, Vec<String>>> {
        for (name, values) in &self.pipeline_variables {
            if values.is_empty() {
                warn!(variable = %name, "pipeline variable has no values; ignored");
            }
            for value in values {
                check_variable(name, value).map_err(|e| Error::Invalid(format!("pipelineVariables: {e}")))?;
            }
        }
        Ok(self.pipeline_variables.clone())
    }

    pub fn backend(&self, base: &Path) -> Result<BackendConfig> {
        match &self.pipeline {
            PipelineRef::Path(p) => parse_pipeline_yaml(&read(&resolve_path(base, p))?),
            PipelineRef::InlineLocal(local) => Ok(BackendConfig::Local(local.clone())),
            PipelineRef::Profile(profile) => profile.clone().into_backend(),
        }
    }

    /// Encoding profiles are JSON; YAML is accepted as a superset.
    pub fn encoding_profile(&self, base: &Path) -> Result<Value> {
        match &self.encoding_profile {
            None => Ok(Value::Object(Default::default())),
            Some(EncodingProfileRef::Inline(v)) => Ok(v.clone()),
            Some(EncodingProfileRef::Path(p)) => Ok(serde_yaml::from_str(&read(&resolve_path(base, p))?)?),
        }
    }

    pub fn resolve(self, base: &Path) -> Result<ResolvedJob> {
        if self.method == Method::WalkTheHull {
            warn!(job = %self.name, "walkTheHull requested");
            return Err(Error::Invalid("method `walkTheHull` is not supported; use `bruteForce`".into()));
        }
        let backend = self.backend(base)?;
        let encoding_profile = self.encoding_profile(base)?;
        let search = self.search_space()?;
        let models = self.models();
        let reference = match &backend {
            BackendConfig::Local(_) if !self.reference.contains("://") => {
                resolve_path(base, &self.reference).to_string_lossy().into_owned()
            }
            _ => self.reference.clone(),
        };
        let pairs = search.pairs().len();
        if pairs == 0 {
            warn!(job = %self.name, "search space is empty; nothing will be encoded");
        }
        info!(job = %self.name, backend = backend.kind(), pairs, models = models.len(), "job resolved");
        debug!(job = %self.name, reference = %reference, "reference location");
        Ok(ResolvedJob {
            name: self.name,
            reference,
            backend,
            encoding_profile,
            models,
            search,
            concurrency: self.concurrency.unwrap_or(true),
            skip_transcode: self.skip_transcode,
            include_all_bitrates: self.include_all_bitrates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL_JOB: &str = r#"
name: demo
pipeline:
  ffmpegPath: /usr/bin/ffmpeg
  pythonPath: python3
  easyVmafPath: /opt/easyVmaf.py
  ffmpegEncoder: libx264
encodingProfile:
  preset: veryfast
reference: /media/ref.mp4
models: [HD, UHD]
resolutions:
  - 1280x720
  - { width: 1920, height: 1080, range: { min: 4000000 } }
bitrates: [1000000, 5000000]
pipelineVariables:
  PRESET: [slow, fast]
"#;

    #[test]
    fn inline_local_job_resolves() {
        let job = parse_job_yaml(LOCAL_JOB).unwrap().resolve(Path::new("/jobs")).unwrap();
        assert_eq!(job.models, vec![QualityModel::Hd, QualityModel::Uhd]);
        assert!(matches!(job.backend, BackendConfig::Local(ref l) if l.ffmpeg_encoder == "libx264"));
        assert_eq!(job.encoding_profile["preset"], "veryfast");
        assert!(job.concurrency);
        assert!(matches!(job.search.filter, PairFilter::AcceptAll));
        // 720p x 2 bitrates + 1080p x 1 bitrate, each for 2 presets
        assert_eq!(job.search.pairs().len(), 6);
        assert_eq!(job.reference, "/media/ref.mp4");
    }

    #[test]
    fn defaults_apply_when_lists_are_omitted() {
        let job = parse_job_yaml("name: a\npipeline: p.yml\nreference: r.mp4\n").unwrap();
        assert_eq!(job.models(), vec![QualityModel::Hd]);
        let space = job.search_space().unwrap();
        assert_eq!(space.bitrates.len(), 32);
        assert_eq!(space.resolutions.len(), 5);
        assert!(matches!(space.filter, PairFilter::BitsPerPixel { .. }));
    }

    #[test]
    fn aws_profile_with_legacy_bucket() {
        let backend = parse_pipeline_yaml(
            r#"
aws:
  s3Bucket: media
  mediaConvertRole: arn:aws:iam::1:role/mc
  mediaConvertEndpoint: https://abc.mediaconvert.eu-north-1.amazonaws.com
  ecsSubnet: subnet-1
  ecsSecurityGroup: sg-1
  ecsCluster: vmaf
  ecsContainerName: easyvmaf
  ecsTaskDefinition: easyvmaf-task
"#,
        )
        .unwrap();
        match backend {
            BackendConfig::Cloud(c) => {
                assert_eq!(c.input_bucket, "media");
                assert_eq!(c.output_bucket, "media");
                assert_eq!(c.ffprobe_path, PathBuf::from("ffprobe"));
            }
            other => panic!("expected aws backend, got {other:?}"),
        }
    }

    #[test]
    fn config_errors_are_reported() {
        assert!(parse_pipeline_yaml("aws:\n  inputBucket: a\n").is_err());
        assert!(parse_pipeline_yaml("{}\n").is_err());
        assert!(parse_job_yaml("name: ''\npipeline: p\nreference: r\n").is_err());
        assert!(parse_job_yaml("name: a\npipeline: p\nreference: r\nmodels: [SD]\n").is_err());

        let hull = parse_job_yaml("name: a\npipeline: {local: null}\nreference: r\nmethod: walkTheHull\n").unwrap();
        assert!(matches!(hull.resolve(Path::new(".")), Err(Error::Invalid(_))));
    }

    #[test]
    fn pipeline_and_profile_files_resolve_relative_to_job() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pipeline.yml"),
            "local:\n  ffmpegPath: ffmpeg\n  pythonPath: python3\n  easyVmafPath: easyVmaf.py\n  ffmpegEncoder: libx265\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("profile.json"), r#"{"preset": "slow", "x265-params": "aq-mode=3"}"#).unwrap();
        std::fs::write(
            dir.path().join("job.yml"),
            "name: j\npipeline: pipeline.yml\nencodingProfile: profile.json\nreference: ref.mp4\nconcurrency: false\n",
        )
        .unwrap();

        let job = load_job_file(&dir.path().join("job.yml")).unwrap();
        assert_eq!(job.encoding_profile["x265-params"], "aq-mode=3");
        assert!(!job.concurrency);
        assert_eq!(job.reference, dir.path().join("ref.mp4").to_string_lossy());
    }

    #[test]
    fn variables_outside_the_name_alphabet_are_rejected() {
        let underscored = parse_job_yaml(
            "name: a\npipeline: p\nreference: r\npipelineVariables:\n  GOP_SIZE: ['48']\n",
        )
        .unwrap();
        let err = underscored.search_space().unwrap_err();
        assert!(matches!(err, Error::Invalid(ref m) if m.contains("GOP_SIZE")));

        let spaced = parse_job_yaml(LOCAL_JOB.replace("[slow, fast]", "[slow, 'very fast']").as_str()).unwrap();
        assert!(matches!(spaced.resolve(Path::new("/jobs")), Err(Error::Invalid(_))));

        let fine = parse_job_yaml("name: a\npipeline: p\nreference: r\npipelineVariables:\n  gop-len: ['2.5']\n").unwrap();
        assert!(fine.search_space().is_ok());
    }

    #[test]
    fn encore_profile_selects_the_encore_backend() {
        let backend = parse_pipeline_yaml(
            r#"
encore:
  apiAddress: https://api.encore.example
  token: secret
  instanceId: autoabr
  profilesUrl: https://profiles.example/profiles.yml
  encorePollingInterval_ms: 2000
  pythonPath: python3
  easyVmafPath: /opt/easyVmaf.py
"#,
        )
        .unwrap();
        assert_eq!(backend.kind(), "encore");
        match backend {
            BackendConfig::Encore(e) => assert_eq!(e.polling_interval_ms, 2000),
            other => panic!("expected encore backend, got {other:?}"),
        }

        let missing = parse_pipeline_yaml(
            "encore:\n  apiAddress: a\n  token: ''\n  instanceId: i\n  profilesUrl: p\n  pythonPath: p\n  easyVmafPath: e\n",
        );
        assert!(matches!(missing, Err(Error::Core(_))));
    }
}
