//! Run manifest recorded with every analysis report.
//!
//! Identifies which search space and reference produced a set of ladders, so
//! reports from repeated runs over the same artifacts can be compared.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub id: ManifestId,

    /// Job name (also the artifact directory).
    pub job_name: String,

    /// Stable hash of the candidate search space (resolutions, bitrates, variables).
    pub search_hash: Hash256,

    /// Reference location as handed to the backend.
    pub reference: String,

    /// Engine version string for provenance.
    pub engine_version: String,

    pub pairs_total: usize,
    pub pairs_failed: usize,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl RunManifest {
    pub fn new(job_name: impl Into<String>, reference: impl Into<String>, search_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            job_name: job_name.into(),
            search_hash,
            reference: reference.into(),
            engine_version: crate::VERSION.to_string(),
            pairs_total: 0,
            pairs_failed: 0,
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, pairs_total: usize, pairs_failed: usize) -> Self {
        self.finished_ms = finished_ms;
        self.pairs_total = pairs_total;
        self.pairs_failed = pairs_failed;
        self
    }
}

/// Milliseconds since the Unix epoch, saturating to zero on clock skew.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
