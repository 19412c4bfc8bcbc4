#![forbid(unsafe_code)]
//! autoabr-core: shared value types for ABR ladder analysis.
//!
//! Responsibilities:
//! - Resolutions, bitrate ranges, quality models, and candidate pairs.
//! - The artifact naming convention (encode and parse) that lets results be
//!   re-associated with the parameters that produced them.
//! - Engine/backend configuration, run manifests, and stable hashing.
//!
//! **No async, no process spawning, no storage** here.

pub mod config;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod model;
pub mod naming;
pub mod pair;
pub mod prelude;
pub mod resolution;
pub mod result;

pub use config::{
    BackendConfig, CloudBackendConfig, EncoreBackendConfig, EngineConfig, LocalBackendConfig, StorageConfig,
};
pub use error::{Error, Result};
pub use model::QualityModel;
pub use pair::{CandidatePair, Variables};
pub use resolution::{BitrateRange, Resolution, ResolutionTarget};
pub use result::{CpuTime, LadderRung, QualityResult, ScoreFamily};

/// Version string recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
