//! Aggregate VMAF scores from a quality-result artifact.
//!
//! Recognised shapes:
//! - `pooled_metrics.vmaf.harmonic_mean` (libvmaf JSON log)
//! - `"VMAF score"` (flat, older measurement tool output)
//! - `pooled_metrics.vmaf_hd.harmonic_mean` / `pooled_metrics.vmaf_hd_phone.harmonic_mean`

use std::collections::BTreeMap;

use autoabr_core::ScoreFamily;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct VmafReport {
    #[serde(default)]
    pooled_metrics: Option<PooledMetrics>,
    #[serde(default, rename = "VMAF score")]
    vmaf_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PooledMetrics {
    #[serde(default)]
    vmaf: Option<Pooled>,
    #[serde(default)]
    vmaf_hd: Option<Pooled>,
    #[serde(default)]
    vmaf_hd_phone: Option<Pooled>,
}

#[derive(Debug, Default, Deserialize)]
struct Pooled {
    #[serde(default)]
    harmonic_mean: Option<f64>,
}

fn harmonic(p: &Option<Pooled>) -> Option<f64> {
    p.as_ref().and_then(|p| p.harmonic_mean)
}

/// Extract every score family present. Only malformed JSON is an error.
pub fn parse_scores(bytes: &[u8]) -> Result<BTreeMap<ScoreFamily, f64>, serde_json::Error> {
    let report: VmafReport = serde_json::from_slice(bytes)?;
    let pooled = report.pooled_metrics.unwrap_or_default();

    let mut scores = BTreeMap::new();
    if let Some(v) = harmonic(&pooled.vmaf).or(report.vmaf_score) {
        scores.insert(ScoreFamily::Vmaf, v);
    }
    if let Some(v) = harmonic(&pooled.vmaf_hd) {
        scores.insert(ScoreFamily::VmafHd, v);
    }
    if let Some(v) = harmonic(&pooled.vmaf_hd_phone) {
        scores.insert(ScoreFamily::VmafHdPhone, v);
    }
    scores.retain(|_, v| v.is_finite());
    Ok(scores)
}
