//! Scripted process runner shared by backend tests.

use std::sync::Mutex;

use async_trait::async_trait;
use autoabr_core::naming::{dirname, join, quality_file_name};

use crate::error::{ExecError, Result};
use crate::local::NULL_SINK;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, LineSink};

pub(crate) const PROBE_JSON: &str =
    r#"{"streams":[{"codec_type":"video","bit_rate":"480000"}],"format":{"duration":"10.0","bit_rate":"512000"}}"#;

pub(crate) const VMAF_JSON: &str = r#"{"pooled_metrics":{"vmaf":{"harmonic_mean":85.628489}}}"#;

/// Pretends to be ffprobe, ffmpeg and easyVmaf, producing their files.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    failing: Option<String>,
}

impl ScriptedRunner {
    /// Every invocation of `program` writes its output and then exits non-zero.
    pub(crate) fn failing(program: &str) -> Self {
        Self {
            calls: Mutex::default(),
            failing: Some(program.to_string()),
        }
    }

    pub(crate) fn last_call(&self, program: &str) -> Option<CommandSpec> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.program.file_name().is_some_and(|n| n == program))
            .cloned()
    }

    pub(crate) fn calls_to(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program.file_name().is_some_and(|n| n == program))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec, on_line: Option<&LineSink>) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());
        let program = spec
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut stdout = Vec::new();
        match program.as_str() {
            "ffprobe" => stdout = PROBE_JSON.as_bytes().to_vec(),
            "ffmpeg" => {
                if let Some(sink) = on_line {
                    sink("frame=120");
                    sink("out_time_us=5000000");
                    sink("progress=end");
                }
                if let Some(target) = spec.args.last().filter(|t| t.as_str() != NULL_SINK) {
                    std::fs::write(target, b"variant")?;
                }
            }
            _ => {
                if let Some(distorted) = spec.value_of("-d") {
                    let produced = join(dirname(distorted), &quality_file_name(distorted));
                    std::fs::write(produced, VMAF_JSON)?;
                }
            }
        }

        if self.failing.as_deref() == Some(program.as_str()) {
            return Err(ExecError::Process {
                program,
                status: "exit status: 1".into(),
                stderr: "scripted failure".into(),
            });
        }
        Ok(CommandOutput { stdout })
    }
}
