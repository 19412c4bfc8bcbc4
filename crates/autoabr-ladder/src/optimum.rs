//! Per-bitrate optimum.

use std::collections::BTreeMap;

use autoabr_core::{LadderRung, QualityResult};
use tracing::debug;

/// One rung-shaped sample per result, scored by its primary score.
///
/// Results without a finite score are left out.
pub fn samples_from_results(results: &[QualityResult]) -> Vec<LadderRung> {
    results
        .iter()
        .filter_map(|r| match r.primary_score() {
            Some(vmaf) if vmaf.is_finite() => Some(LadderRung {
                resolution: r.resolution,
                bitrate: r.target_bitrate,
                vmaf,
            }),
            _ => {
                debug!(artifact = %r.source_filename, "result has no usable score");
                None
            }
        })
        .collect()
}

/// Highest-scoring sample per target bitrate, ascending by bitrate.
///
/// Equal scores keep the sample seen first.
pub fn per_bitrate_optimum<I>(samples: I) -> Vec<LadderRung>
where
    I: IntoIterator<Item = LadderRung>,
{
    let mut best: BTreeMap<u64, LadderRung> = BTreeMap::new();
    for sample in samples {
        match best.get_mut(&sample.bitrate) {
            Some(current) if sample.vmaf > current.vmaf => *current = sample,
            Some(_) => {}
            None => {
                best.insert(sample.bitrate, sample);
            }
        }
    }
    best.into_values().collect()
}
