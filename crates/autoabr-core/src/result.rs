//! Parsed quality results and ladder rungs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pair::Variables;
use crate::resolution::Resolution;

/// A family of aggregate scores a quality artifact may carry.
///
/// Declaration order is the primary-score preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreFamily {
    #[serde(rename = "vmaf")]
    Vmaf,
    #[serde(rename = "vmafHd")]
    VmafHd,
    #[serde(rename = "vmafHdPhone")]
    VmafHdPhone,
}

impl ScoreFamily {
    pub const ALL: [ScoreFamily; 3] = [ScoreFamily::Vmaf, ScoreFamily::VmafHd, ScoreFamily::VmafHdPhone];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreFamily::Vmaf => "vmaf",
            ScoreFamily::VmafHd => "vmafHd",
            ScoreFamily::VmafHdPhone => "vmafHdPhone",
        }
    }
}

/// Timing of the first encode pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuTime {
    /// Wall-clock seconds.
    pub real_time: f64,
    /// User plus kernel CPU seconds.
    pub cpu_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityResult {
    pub source_filename: String,
    pub resolution: Resolution,
    pub target_bitrate: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: Variables,
    pub scores: BTreeMap<ScoreFamily, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time: Option<CpuTime>,
}

impl QualityResult {
    pub fn score(&self, family: ScoreFamily) -> Option<f64> {
        self.scores.get(&family).copied()
    }

    /// The first present score in [`ScoreFamily`] order.
    pub fn primary_score(&self) -> Option<f64> {
        ScoreFamily::ALL.iter().find_map(|f| self.score(*f))
    }
}

/// One ladder entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderRung {
    pub resolution: Resolution,
    pub bitrate: u64,
    pub vmaf: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_score_prefers_plain_vmaf() {
        let mut r = QualityResult {
            source_filename: "1280x720_500000_vmaf.json".into(),
            resolution: Resolution::new(1280, 720),
            target_bitrate: 500_000,
            variables: Variables::new(),
            scores: BTreeMap::new(),
            actual_bitrate: None,
            cpu_time: None,
        };
        assert_eq!(r.primary_score(), None);
        r.scores.insert(ScoreFamily::VmafHdPhone, 91.0);
        assert_eq!(r.primary_score(), Some(91.0));
        r.scores.insert(ScoreFamily::Vmaf, 80.5);
        assert_eq!(r.primary_score(), Some(80.5));
    }
}
