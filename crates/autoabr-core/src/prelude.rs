//! Convenient re-exports for downstream crates.

pub use crate::config::{BackendConfig, EngineConfig, StorageConfig};
pub use crate::error::{Error, Result};
pub use crate::manifest::{ManifestId, RunManifest};
pub use crate::model::QualityModel;
pub use crate::naming::{artifact_stem, parse_artifact_name, ParsedArtifactName};
pub use crate::pair::{CandidatePair, Variables};
pub use crate::resolution::{BitrateRange, Resolution, ResolutionTarget};
pub use crate::result::{CpuTime, LadderRung, QualityResult, ScoreFamily};
