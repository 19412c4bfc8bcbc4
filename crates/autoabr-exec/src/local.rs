//! Local backend: ffmpeg for encoding, easyVmaf for quality measurement.
//!
//! Both tools run as child processes, one invocation at a time per call.
//! Artifacts live on the local filesystem under the job directory.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use autoabr_core::config::LocalBackendConfig;
use autoabr_core::naming::{basename, dirname, join, metadata_location, quality_file_name, strip_extension};
use autoabr_core::{QualityModel, Resolution, Variables};
use autoabr_io::{ArtifactStore, FsStore};
use serde_json::Value;
use tracing::{debug, info, warn, Instrument};

use crate::backend::{ExecutionBackend, ProgressFn, TranscodeProgress};
use crate::error::{ExecError, Result};
use crate::metrics;
use crate::probe::{duration_secs, probe};
use crate::process::{CommandRunner, CommandSpec, LineSink, TokioRunner};
use crate::template::{substitute, TemplateParams};

/// First-pass output sink.
pub const NULL_SINK: &str = "/dev/null";

/// Encoders write here and the file is renamed into place on success, so an
/// interrupted encode never looks like a finished variant.
pub fn partial_location(output: &str) -> String {
    format!("{output}.part")
}

pub struct LocalBackend {
    cfg: LocalBackendConfig,
    /// Encoder options from the encoding profile, flags normalised to `-name`.
    options: Vec<(String, String)>,
    store: Arc<FsStore>,
    runner: Arc<dyn CommandRunner>,
    progress: Option<ProgressFn>,
}

impl LocalBackend {
    pub fn new(cfg: LocalBackendConfig, encoding_profile: &Value) -> Result<Self> {
        Self::with_runner(cfg, encoding_profile, Arc::new(TokioRunner))
    }

    pub fn with_runner(
        cfg: LocalBackendConfig,
        encoding_profile: &Value,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let options = match encoding_profile {
            Value::Null => Vec::new(),
            Value::Object(map) => map
                .iter()
                .map(|(flag, value)| Ok((normalize_flag(flag), option_value(flag, value)?)))
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(ExecError::Config(
                    "local encoding profile must be a map of encoder options".into(),
                ))
            }
        };
        Ok(Self {
            cfg,
            options,
            store: Arc::new(FsStore::new()),
            runner,
            progress: None,
        })
    }

    /// Receive encode progress instead of the default debug log.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Encoder options in command-line order; profile entries override defaults with the same flag.
    pub fn encode_options(&self, params: &TemplateParams<'_>) -> Vec<(String, String)> {
        let Resolution { width, height } = params.resolution;
        let mut opts = vec![
            ("-vf".to_string(), format!("scale={width}:{height}")),
            ("-c:v".to_string(), self.cfg.ffmpeg_encoder.clone()),
        ];
        if !self.cfg.skip_default_options {
            opts.push(("-b:v".to_string(), params.bitrate.to_string()));
            opts.push(("-maxrate".to_string(), params.bitrate.to_string()));
            opts.push(("-bufsize".to_string(), (params.bitrate * 2).to_string()));
        }
        for (flag, raw) in &self.options {
            let value = substitute(raw, params);
            match opts.iter_mut().find(|(f, _)| f == flag) {
                Some(slot) => slot.1 = value,
                None => opts.push((flag.clone(), value)),
            }
        }
        opts
    }

    /// One command per encoder pass; the last pass writes an MP4 to `output`.
    pub fn encode_commands(&self, params: &TemplateParams<'_>, output: &str) -> Vec<CommandSpec> {
        let mut base = CommandSpec::new(&self.cfg.ffmpeg_path).args(["-y", "-i", params.input]);
        for (flag, value) in self.encode_options(params) {
            base = base.arg(flag).arg(value);
        }
        base = base.args(["-progress", "pipe:1", "-nostats"]);

        if self.cfg.only_one_pass {
            return vec![base.args(["-f", "mp4", output])];
        }
        vec![
            base.clone()
                .args(["-pass", "1", "-passlogfile", output, "-an", "-f", "mp4", NULL_SINK]),
            base.args(["-pass", "2", "-passlogfile", output, "-f", "mp4", output]),
        ]
    }

    pub fn quality_command(&self, reference: &str, distorted: &str, model: QualityModel) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.cfg.python_path)
            .arg(self.cfg.easy_vmaf_path.display().to_string())
            .args(["-r", reference, "-d", distorted, "-endsync", "-model", model.tool_model()]);
        if model.phone() {
            cmd = cmd.arg("-phone");
        }
        cmd
    }

    fn progress_sink(&self, output: &str, pass: u8, duration: Option<f64>) -> Box<LineSink> {
        let progress = self.progress.clone();
        let output = output.to_string();
        Box::new(move |line: &str| {
            let Some(micros) = line
                .strip_prefix("out_time_us=")
                .or_else(|| line.strip_prefix("out_time_ms="))
                .and_then(|v| v.trim().parse::<f64>().ok())
            else {
                return;
            };
            let Some(total) = duration else { return };
            let update = TranscodeProgress {
                output: output.clone(),
                pass,
                percent: (micros / 1_000_000.0 / total * 100.0).clamp(0.0, 100.0),
            };
            match &progress {
                Some(f) => f(&update),
                None => debug!(output = %update.output, pass, percent = update.percent, "encode progress"),
            }
        })
    }

    async fn discard_partial(&self, partial: &str) {
        if let Err(e) = tokio::fs::remove_file(partial).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(partial, error = %e, "could not remove partial variant");
            }
        }
    }

    async fn remove_pass_logs(&self, passlog: &str) {
        for suffix in ["-0.log", "-0.log.mbtree"] {
            let _ = tokio::fs::remove_file(format!("{passlog}{suffix}")).await;
        }
    }

    async fn encode(
        &self,
        input: &str,
        resolution: Resolution,
        bitrate: u64,
        output: &str,
        variables: &Variables,
    ) -> Result<Option<String>> {
        if self.store.exists(output).await? {
            info!(output, "variant exists, skipping encode");
            return Ok(Some(output.to_string()));
        }
        create_parent(output).await?;
        let partial = partial_location(output);
        self.discard_partial(&partial).await;

        let duration = match probe(&*self.runner, &self.cfg.ffprobe(), input).await {
            Ok(probed) => duration_secs(&probed),
            Err(e) => {
                warn!(input, error = %e, "could not probe input duration; progress disabled");
                None
            }
        };

        let params = TemplateParams {
            input,
            output: strip_extension(output),
            resolution,
            bitrate,
            variables,
        };
        for (i, cmd) in self.encode_commands(&params, &partial).iter().enumerate() {
            let pass = u8::try_from(i + 1).unwrap_or(u8::MAX);
            let sink = self.progress_sink(output, pass, duration);
            if let Err(e) = self.runner.run(cmd, Some(&*sink)).await {
                self.discard_partial(&partial).await;
                self.remove_pass_logs(&partial).await;
                return Err(e);
            }
        }
        self.remove_pass_logs(&partial).await;
        if let Err(e) = tokio::fs::rename(&partial, output).await {
            self.discard_partial(&partial).await;
            return Err(e.into());
        }
        info!(output, "variant encoded");
        Ok(Some(output.to_string()))
    }

    async fn measure(
        &self,
        reference: &str,
        distorted: &str,
        output: &str,
        model: QualityModel,
    ) -> Result<Option<String>> {
        if self.store.exists(output).await? {
            info!(output, "quality result exists, skipping analysis");
            self.ensure_metadata(distorted, output).await;
            return Ok(Some(output.to_string()));
        }
        create_parent(output).await?;

        // easyVmaf writes its result beside the distorted input, so each
        // model measures its own link to keep concurrent runs apart.
        let out_dir = dirname(output);
        let staged = join(out_dir, basename(distorted));
        let staged_here = Path::new(&staged) != Path::new(distorted);
        if staged_here {
            stage_file(distorted, &staged).await?;
        }

        let run = self.runner.run(&self.quality_command(reference, &staged, model), None).await;
        let produced = join(out_dir, &quality_file_name(&staged));
        let moved = match run {
            Ok(_) if produced != output => tokio::fs::rename(&produced, output).await.map_err(ExecError::from),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        if staged_here {
            if let Err(e) = tokio::fs::remove_file(&staged).await {
                warn!(staged, error = %e, "could not remove staged variant");
            }
        }
        moved?;

        self.ensure_metadata(distorted, output).await;
        info!(output, "quality measured");
        Ok(Some(output.to_string()))
    }

    /// Write the ffprobe sidecar next to `output` unless it is already there.
    async fn ensure_metadata(&self, distorted: &str, output: &str) {
        let sidecar = metadata_location(output);
        match self.store.exists(&sidecar).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(sidecar, error = %e, "could not check metadata sidecar");
                return;
            }
        }
        let written = async {
            let probed = probe(&*self.runner, &self.cfg.ffprobe(), distorted).await?;
            let bytes = serde_json::to_vec_pretty(&probed).map_err(|e| ExecError::Config(e.to_string()))?;
            self.store.write(&sidecar, bytes).await?;
            Ok::<_, ExecError>(())
        };
        if let Err(e) = written.await {
            warn!(distorted, sidecar, error = %e, "metadata sidecar not written");
        }
    }
}

fn normalize_flag(flag: &str) -> String {
    if flag.starts_with('-') {
        flag.to_string()
    } else {
        format!("-{flag}")
    }
}

fn option_value(flag: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ExecError::Config(format!(
            "encoder option `{flag}` must be a string, number or boolean"
        ))),
    }
}

async fn create_parent(location: &str) -> Result<()> {
    let dir = dirname(location);
    if !dir.is_empty() {
        tokio::fs::create_dir_all(dir).await?;
    }
    Ok(())
}

/// Hard-link `source` to `target`, copying when linking is not possible.
async fn stage_file(source: &str, target: &str) -> Result<()> {
    let _ = tokio::fs::remove_file(target).await;
    if tokio::fs::hard_link(source, target).await.is_err() {
        tokio::fs::copy(source, target).await?;
    }
    Ok(())
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn transcode(
        &self,
        input: &str,
        resolution: Resolution,
        bitrate: u64,
        output: &str,
        variables: &Variables,
    ) -> Result<Option<String>> {
        self.encode(input, resolution, bitrate, output, variables)
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
        self.measure(reference, distorted, output, model)
            .instrument(metrics::quality_span(model, output))
            .await
    }

    fn variant_location(&self, output: &str) -> String {
        output.to_string()
    }

    fn artifact_store(&self) -> Arc<dyn ArtifactStore> {
        self.store.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;
    use serde_json::json;
    use std::sync::Mutex;

    fn config(only_one_pass: bool) -> LocalBackendConfig {
        LocalBackendConfig {
            ffmpeg_path: "/opt/ffmpeg/ffmpeg".into(),
            ffprobe_path: None,
            python_path: "python3".into(),
            easy_vmaf_path: "/opt/easyVmaf/easyVmaf.py".into(),
            ffmpeg_encoder: "libx264".into(),
            only_one_pass,
            skip_default_options: false,
        }
    }

    fn params(vars: &Variables) -> TemplateParams<'_> {
        TemplateParams {
            input: "ref.mp4",
            output: "job/1280x720_500000",
            resolution: Resolution::new(1280, 720),
            bitrate: 500_000,
            variables: vars,
        }
    }

    #[test]
    fn profile_overrides_defaults_in_place() {
        let runner = Arc::new(ScriptedRunner::default());
        let backend = LocalBackend::with_runner(
            config(false),
            &json!({"maxrate": "${HRDBUFFER}", "-preset": "${PRESET}", "crf": 23}),
            runner,
        )
        .unwrap();
        let mut vars = Variables::new();
        vars.insert("PRESET".into(), "slow".into());

        let opts = backend.encode_options(&params(&vars));
        let flags: Vec<&str> = opts.iter().map(|(f, _)| f.as_str()).collect();
        assert_eq!(flags, ["-vf", "-c:v", "-b:v", "-maxrate", "-bufsize", "-crf", "-preset"]);
        assert_eq!(opts[0].1, "scale=1280:720");
        assert_eq!(opts[3].1, "1000000");
        assert_eq!(opts[5].1, "23");
        assert_eq!(opts[6].1, "slow");
    }

    #[test]
    fn skip_default_options_leaves_rate_control_to_profile() {
        let mut cfg = config(true);
        cfg.skip_default_options = true;
        let backend =
            LocalBackend::with_runner(cfg, &json!({"crf": "28"}), Arc::new(ScriptedRunner::default())).unwrap();
        let cmds = backend.encode_commands(&params(&Variables::new()), "job/out.mp4");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].value_of("-b:v"), None);
        assert_eq!(cmds[0].value_of("-crf"), Some("28"));
        assert_eq!(cmds[0].value_of("-pass"), None);
        assert_eq!(cmds[0].value_of("-f"), Some("mp4"));
        assert_eq!(cmds[0].args.last().map(String::as_str), Some("job/out.mp4"));
    }

    #[test]
    fn two_pass_commands() {
        let backend =
            LocalBackend::with_runner(config(false), &Value::Null, Arc::new(ScriptedRunner::default())).unwrap();
        let cmds = backend.encode_commands(&params(&Variables::new()), "job/out.mp4");
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].value_of("-pass"), Some("1"));
        assert_eq!(cmds[0].args.last().map(String::as_str), Some(NULL_SINK));
        assert_eq!(cmds[1].value_of("-pass"), Some("2"));
        assert_eq!(cmds[1].value_of("-passlogfile"), Some("job/out.mp4"));
        assert_eq!(cmds[1].args.last().map(String::as_str), Some("job/out.mp4"));
    }

    #[test]
    fn quality_model_flags() {
        let backend =
            LocalBackend::with_runner(config(false), &Value::Null, Arc::new(ScriptedRunner::default())).unwrap();
        let phone = backend.quality_command("r.mp4", "d.mp4", QualityModel::PhoneHd);
        assert_eq!(phone.value_of("-model"), Some("HD"));
        assert_eq!(phone.args.last().map(String::as_str), Some("-phone"));
        let uhd = backend.quality_command("r.mp4", "d.mp4", QualityModel::Uhd);
        assert_eq!(uhd.value_of("-model"), Some("4K"));
        assert!(!uhd.args.iter().any(|a| a == "-phone"));
        assert!(uhd.args.iter().any(|a| a == "-endsync"));
    }

    #[test]
    fn rejects_nested_profile_values() {
        let err = LocalBackend::with_runner(
            config(false),
            &json!({"x264-params": {"a": 1}}),
            Arc::new(ScriptedRunner::default()),
        );
        assert!(matches!(err, Err(ExecError::Config(_))));
    }

    #[tokio::test]
    async fn transcode_encodes_once_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let backend = LocalBackend::with_runner(config(false), &Value::Null, runner.clone())
            .unwrap()
            .with_progress(Arc::new(move |p: &TranscodeProgress| sink.lock().unwrap().push((p.pass, p.percent))));

        let output = dir.path().join("job/1280x720_500000.mp4").display().to_string();
        let res = Resolution::new(1280, 720);
        let first = backend.transcode("ref.mp4", res, 500_000, &output, &Variables::new()).await.unwrap();
        assert_eq!(first.as_deref(), Some(output.as_str()));
        assert!(Path::new(&output).exists());
        assert_eq!(runner.calls_to("ffmpeg"), 2);
        assert_eq!(*seen.lock().unwrap(), vec![(1, 50.0), (2, 50.0)]);

        let second = backend.transcode("ref.mp4", res, 500_000, &output, &Variables::new()).await.unwrap();
        assert_eq!(second.as_deref(), Some(output.as_str()));
        assert_eq!(runner.calls_to("ffmpeg"), 2);
    }

    #[tokio::test]
    async fn failed_encode_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::failing("ffmpeg"));
        let backend = LocalBackend::with_runner(config(true), &Value::Null, runner.clone()).unwrap();

        let output = dir.path().join("job/640x360_300000.mp4").display().to_string();
        let err = backend
            .transcode("ref.mp4", Resolution::new(640, 360), 300_000, &output, &Variables::new())
            .await;
        assert!(matches!(err, Err(ExecError::Process { .. })));
        assert!(!Path::new(&output).exists());
        assert!(!Path::new(&partial_location(&output)).exists());
    }

    #[tokio::test]
    async fn interrupted_encode_is_not_a_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let backend = LocalBackend::with_runner(config(true), &Value::Null, runner.clone()).unwrap();

        let output = dir.path().join("job/640x360_300000.mp4").display().to_string();
        std::fs::create_dir_all(dir.path().join("job")).unwrap();
        // A killed encoder leaves only the partial file behind.
        std::fs::write(partial_location(&output), b"trunc").unwrap();

        let got = backend
            .transcode("ref.mp4", Resolution::new(640, 360), 300_000, &output, &Variables::new())
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some(output.as_str()));
        assert_eq!(runner.calls_to("ffmpeg"), 1);
        assert_eq!(std::fs::read(&output).unwrap(), b"variant");
        assert!(!Path::new(&partial_location(&output)).exists());
    }

    #[tokio::test]
    async fn analysis_relocates_result_and_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::default());
        let backend = LocalBackend::with_runner(config(false), &Value::Null, runner.clone()).unwrap();

        let job = dir.path().join("job");
        std::fs::create_dir_all(&job).unwrap();
        let distorted = job.join("1280x720_500000.mp4").display().to_string();
        std::fs::write(&distorted, b"variant").unwrap();
        let output = job.join("HD/1280x720_500000_vmaf.json").display().to_string();

        let got = backend
            .analyze_quality("ref.mp4", &distorted, &output, QualityModel::Hd)
            .await
            .unwrap();
        assert_eq!(got.as_deref(), Some(output.as_str()));
        assert!(Path::new(&output).exists());
        assert!(job.join("HD/1280x720_500000_metadata.json").exists());
        assert!(!job.join("HD/1280x720_500000.mp4").exists(), "staged link must be removed");
        assert!(Path::new(&distorted).exists());
        assert_eq!(runner.calls_to("python3"), 1);

        // Cache hit still repairs a missing sidecar.
        std::fs::remove_file(job.join("HD/1280x720_500000_metadata.json")).unwrap();
        backend
            .analyze_quality("ref.mp4", &distorted, &output, QualityModel::Hd)
            .await
            .unwrap();
        assert_eq!(runner.calls_to("python3"), 1);
        assert!(job.join("HD/1280x720_500000_metadata.json").exists());
    }
}
