//! ffprobe invocation.

use std::path::Path;

use serde_json::Value;

use crate::error::{ExecError, Result};
use crate::process::{CommandRunner, CommandSpec};

pub fn probe_command(ffprobe: &Path, target: &str) -> CommandSpec {
    CommandSpec::new(ffprobe).args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        target,
    ])
}

/// Full ffprobe JSON for `target`, as persisted in metadata sidecars.
pub async fn probe(runner: &dyn CommandRunner, ffprobe: &Path, target: &str) -> Result<Value> {
    let output = runner.run(&probe_command(ffprobe, target), None).await?;
    serde_json::from_slice(&output.stdout)
        .map_err(|e| ExecError::Config(format!("ffprobe returned invalid JSON for {target}: {e}")))
}

/// Container duration in seconds (`format.duration`).
pub fn duration_secs(probe: &Value) -> Option<f64> {
    match probe.get("format")?.get("duration")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .filter(|d: &f64| *d > 0.0)
}
