#![forbid(unsafe_code)]
//! autoabr-exec: execution backends and the ladder analysis orchestrator.
//!
//! - `backend`: the `ExecutionBackend` capability (transcode, analyze quality).
//! - `local`: ffmpeg + easyVmaf child processes on the local filesystem.
//! - `cloud`: S3 artifacts, batch transcode jobs and container analysis tasks.
//! - `encore`: transcodes on an Encore instance, quality measured locally.
//! - `scheduler`: sequential or bounded concurrent fan-out.
//! - `runtime`: the `Analyzer` that turns a search space into ladders.

pub mod backend;
pub mod cloud;
pub mod encore;
pub mod error;
pub mod local;
pub mod metrics;
pub mod probe;
pub mod process;
pub mod runtime;
pub mod scheduler;
pub mod template;

#[cfg(test)]
mod testing;

pub use backend::{build_backend, ExecutionBackend, ProgressFn, TranscodeProgress};
pub use cloud::{CloudBackend, CloudServices, PollTiming};
pub use encore::{EncoreApi, EncoreBackend};
pub use error::{ExecError, Result};
pub use local::LocalBackend;
pub use runtime::{AnalysisReport, AnalysisRequest, Analyzer, ModelLadder, PairFailure, PlannedPair};
pub use scheduler::FanOut;
