//! Candidate (resolution, bitrate, variables) triples.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::naming::artifact_stem;
use crate::resolution::Resolution;

/// Named encoder parameters substituted into an encoding profile.
///
/// Ordered so artifact names and hashes are independent of insertion order.
pub type Variables = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidatePair {
    pub resolution: Resolution,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: Variables,
}

impl CandidatePair {
    pub fn new(resolution: Resolution, bitrate: u64) -> Self {
        Self {
            resolution,
            bitrate,
            variables: Variables::new(),
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    /// Artifact stem shared by this pair's variant and quality files.
    pub fn stem(&self) -> String {
        artifact_stem(self.resolution, self.bitrate, &self.variables)
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}
