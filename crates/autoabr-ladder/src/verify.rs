//! Ladder shape checks.
//!
//! The greedy walk does not enforce monotone scores (a 2x bitrate step is kept
//! regardless of score), so these are diagnostics rather than invariants.

use autoabr_core::LadderRung;

/// Strictly ascending bitrates.
pub fn is_ascending(ladder: &[LadderRung]) -> bool {
    ladder.windows(2).all(|w| w[0].bitrate < w[1].bitrate)
}

/// Non-decreasing scores along ascending bitrate.
pub fn is_monotonic(ladder: &[LadderRung]) -> bool {
    ladder.windows(2).all(|w| w[0].vmaf <= w[1].vmaf)
}

/// Adjacent pairs whose score drops as bitrate rises.
pub fn score_inversions(ladder: &[LadderRung]) -> Vec<(LadderRung, LadderRung)> {
    ladder
        .windows(2)
        .filter(|w| w[0].vmaf > w[1].vmaf)
        .map(|w| (w[0], w[1]))
        .collect()
}
