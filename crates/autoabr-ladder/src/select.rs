//! Greedy ladder construction.

use autoabr_core::{LadderRung, QualityResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::optimum::{per_bitrate_optimum, samples_from_results};
use crate::policy::LadderPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectionMode {
    /// Greedy walk; only meaningfully distinct rungs survive.
    #[default]
    Pruned,
    /// Every per-bitrate optimum, for plotting the full curve.
    IncludeAll,
}

/// Walk `optima` from the highest bitrate down and return the kept rungs ascending.
pub fn build_ladder(optima: &[LadderRung], policy: &LadderPolicy) -> Vec<LadderRung> {
    let mut descending = optima.to_vec();
    descending.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));

    let mut ladder: Vec<LadderRung> = Vec::new();
    for sample in descending {
        let keep = match ladder.last() {
            None => sample.vmaf < policy.vmaf_ceiling,
            Some(last) => policy.accepts(last.bitrate, last.vmaf, sample.bitrate, sample.vmaf),
        };
        if keep {
            ladder.push(sample);
        } else {
            debug!(
                bitrate = sample.bitrate,
                width = sample.resolution.width,
                height = sample.resolution.height,
                vmaf = sample.vmaf,
                "rung skipped"
            );
        }
    }
    ladder.reverse();
    ladder
}

pub fn select_ladder(results: &[QualityResult], policy: &LadderPolicy, mode: SelectionMode) -> Vec<LadderRung> {
    let optima = per_bitrate_optimum(samples_from_results(results));
    match mode {
        SelectionMode::IncludeAll => optima,
        SelectionMode::Pruned => build_ladder(&optima, policy),
    }
}

/// A policy and mode bundled for repeated use.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LadderSelector {
    pub policy: LadderPolicy,
    pub mode: SelectionMode,
}

impl LadderSelector {
    pub fn new(policy: LadderPolicy, mode: SelectionMode) -> Self {
        Self { policy, mode }
    }

    pub fn select(&self, results: &[QualityResult]) -> Vec<LadderRung> {
        select_ladder(results, &self.policy, self.mode)
    }
}
