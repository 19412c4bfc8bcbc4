//! External process invocation.
//!
//! Every encoder, measurement tool and probe invocation goes through a
//! `CommandRunner`, so backends can be exercised with scripted runners.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{ExecError, Result};

/// Receives stdout line by line while the process runs.
pub type LineSink = dyn Fn(&str) + Send + Sync;

const STDERR_TAIL: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value following `flag`, if present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is an error carrying the stderr tail.
    async fn run(&self, spec: &CommandSpec, on_line: Option<&LineSink>) -> Result<CommandOutput>;
}

/// Spawns real processes on the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, spec: &CommandSpec, on_line: Option<&LineSink>) -> Result<CommandOutput> {
        let program = spec.program.display().to_string();
        debug!(command = %spec, "spawning");

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Config(format!("stdout of `{program}` was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::Config(format!("stderr of `{program}` was not captured")))?;

        let read_out = async {
            let mut collected = Vec::new();
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(sink) = on_line {
                    sink(&line);
                }
                collected.extend_from_slice(line.as_bytes());
                collected.push(b'\n');
            }
            Ok::<_, std::io::Error>(collected)
        };
        let read_err = async {
            let mut buf = Vec::new();
            BufReader::new(stderr).read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let (out, err, status) = tokio::join!(read_out, read_err, child.wait());
        let status = status?;
        let out = out?;
        let err = err?;

        if !status.success() {
            let text = String::from_utf8_lossy(&err);
            let tail_start = text.len().saturating_sub(STDERR_TAIL);
            let tail_start = (tail_start..text.len()).find(|i| text.is_char_boundary(*i)).unwrap_or(0);
            return Err(ExecError::Process {
                program,
                status: status.to_string(),
                stderr: text[tail_start..].trim().to_string(),
            });
        }
        Ok(CommandOutput { stdout: out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_lookup() {
        let spec = CommandSpec::new("ffmpeg").args(["-y", "-i", "in.mp4"]).arg("-b:v").arg("500000");
        assert_eq!(spec.value_of("-i"), Some("in.mp4"));
        assert_eq!(spec.value_of("-b:v"), Some("500000"));
        assert_eq!(spec.value_of("-maxrate"), None);
        assert_eq!(spec.to_string(), "ffmpeg -y -i in.mp4 -b:v 500000");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_lines_and_failures() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let sink_seen = seen.clone();
        let sink = move |l: &str| sink_seen.lock().unwrap().push(l.to_string());

        let ok = TokioRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo a; echo b"]), Some(&sink))
            .await
            .unwrap();
        assert_eq!(ok.stdout, b"a\nb\n");
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);

        let err = TokioRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Process { ref stderr, .. } if stderr == "boom"));
    }
}
