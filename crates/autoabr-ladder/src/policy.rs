//! Ladder acceptance thresholds.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Thresholds for the greedy ladder walk.
///
/// A candidate below the previous rung is accepted when the bitrate ratio is
/// inside `[min_bitrate_factor, max_bitrate_factor]` and the score drops by
/// more than `min_vmaf_delta`, or unconditionally once the ratio reaches
/// `max_bitrate_factor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LadderPolicy {
    /// A top rung must score strictly below this.
    pub vmaf_ceiling: f64,
    pub min_bitrate_factor: f64,
    pub max_bitrate_factor: f64,
    pub min_vmaf_delta: f64,
}

impl Default for LadderPolicy {
    fn default() -> Self {
        Self {
            vmaf_ceiling: 94.0,
            min_bitrate_factor: 1.5,
            max_bitrate_factor: 2.0,
            min_vmaf_delta: 6.0,
        }
    }
}

impl LadderPolicy {
    pub fn validate(&self) -> Result<()> {
        let finite = [
            self.vmaf_ceiling,
            self.min_bitrate_factor,
            self.max_bitrate_factor,
            self.min_vmaf_delta,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(Error::Policy("thresholds must be finite".into()));
        }
        if self.min_bitrate_factor < 1.0 {
            return Err(Error::Policy(format!(
                "min_bitrate_factor {} must be at least 1.0",
                self.min_bitrate_factor
            )));
        }
        if self.max_bitrate_factor < self.min_bitrate_factor {
            return Err(Error::Policy(format!(
                "max_bitrate_factor {} is below min_bitrate_factor {}",
                self.max_bitrate_factor, self.min_bitrate_factor
            )));
        }
        Ok(())
    }

    /// Whether `candidate` earns a rung below `last`.
    pub fn accepts(&self, last_bitrate: u64, last_vmaf: f64, bitrate: u64, vmaf: f64) -> bool {
        let factor = last_bitrate as f64 / bitrate as f64;
        let delta = last_vmaf - vmaf;
        (factor >= self.min_bitrate_factor && factor <= self.max_bitrate_factor && delta > self.min_vmaf_delta)
            || factor >= self.max_bitrate_factor
    }
}
