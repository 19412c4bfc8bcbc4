//! Tracing spans and events for run lifecycles.
//!
//! Spans carry the pair/job identifiers so log lines emitted by backends are
//! attributable without repeating fields at every call site.

use autoabr_core::{CandidatePair, QualityModel};
use tracing::{info, info_span, Span};

pub fn pair_span(pair: &CandidatePair) -> Span {
    info_span!(
        "analyze_pair",
        width = pair.resolution.width,
        height = pair.resolution.height,
        bitrate = pair.bitrate,
        variables = %format_variables(pair),
    )
}

pub fn transcode_span(output: &str) -> Span {
    info_span!("transcode_job", output)
}

pub fn quality_span(model: QualityModel, output: &str) -> Span {
    info_span!("quality_task", model = model.as_str(), output)
}

/// Single structured event with free-form fields.
pub fn emit_event(event: &str, key_values: &[(&str, String)]) {
    let fields = key_values
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" ");
    info!(event, fields = %fields, "autoabr");
}

fn format_variables(pair: &CandidatePair) -> String {
    pair.variables
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
