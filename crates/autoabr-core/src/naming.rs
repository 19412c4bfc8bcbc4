//! Artifact naming convention.
//!
//! Every artifact derived from a candidate pair carries the pair's parameters
//! in its file name: `{W}x{H}_{BITRATE}[_{NAME}_{VALUE}]*` followed by either a
//! media extension (variants) or `_vmaf.json` (quality results). Parsing that
//! name is the only way results are re-associated with their parameters, so
//! encode and parse must stay inverse for ASCII alphanumeric variables.
//!
//! Locations are `/`-separated strings; the same helpers serve local paths and
//! object store URIs.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;
use crate::pair::Variables;
use crate::resolution::Resolution;

pub const VARIANT_EXTENSION: &str = "mp4";
pub const QUALITY_SUFFIX: &str = "_vmaf.json";
pub const METADATA_SUFFIX: &str = "_metadata.json";
pub const CPU_TIME_SUFFIX: &str = ".pass1-cpu-time.txt";

const ARTIFACT_PATTERN: &str = r"^(?:.*/)?(?P<width>\d+)x(?P<height>\d+)_(?P<bitrate>\d+)(?P<variables>(?:_[A-Za-z0-9-]+_[A-Za-z0-9.]+)*)(?:_vmaf\.json|\.[A-Za-z0-9]+)$";

fn artifact_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(ARTIFACT_PATTERN)).as_ref().ok()
}

/// Parameters recovered from an artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifactName {
    pub resolution: Resolution,
    pub bitrate: u64,
    pub variables: Variables,
}

/// A variable survives the name round trip only when its name uses
/// `[A-Za-z0-9-]` and its value `[A-Za-z0-9.]`; `_` separates the fields.
pub fn check_variable(name: &str, value: &str) -> crate::Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::Config(format!(
            "variable name `{name}` may only contain ASCII letters, digits and '-'"
        )));
    }
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
        return Err(Error::Config(format!(
            "value `{value}` of variable `{name}` may only contain ASCII letters, digits and '.'"
        )));
    }
    Ok(())
}

/// `{W}x{H}_{BITRATE}` followed by `_{NAME}_{VALUE}` per variable, in key order.
pub fn artifact_stem(resolution: Resolution, bitrate: u64, variables: &Variables) -> String {
    debug_assert!(
        variables.iter().all(|(name, value)| check_variable(name, value).is_ok()),
        "variables {variables:?} cannot be encoded in an artifact name"
    );
    let mut stem = format!("{}x{}_{}", resolution.width, resolution.height, bitrate);
    for (name, value) in variables {
        stem.push('_');
        stem.push_str(name);
        stem.push('_');
        stem.push_str(value);
    }
    stem
}

pub fn variant_file_name(stem: &str) -> String {
    format!("{stem}.{VARIANT_EXTENSION}")
}

/// Quality result name for a variant: media extension replaced by `_vmaf.json`.
pub fn quality_file_name(variant: &str) -> String {
    format!("{}{QUALITY_SUFFIX}", strip_extension(basename(variant)))
}

/// Metadata sidecar for a variant or a quality result.
pub fn metadata_location(artifact: &str) -> String {
    match artifact.strip_suffix(QUALITY_SUFFIX) {
        Some(stem) => format!("{stem}{METADATA_SUFFIX}"),
        None => format!("{}{METADATA_SUFFIX}", strip_extension(artifact)),
    }
}

/// First-pass CPU-time sidecar name for the variant with the given stem.
pub fn cpu_time_file_name(stem: &str) -> String {
    format!("{}{CPU_TIME_SUFFIX}", variant_file_name(stem))
}

/// Stem of a quality result or variant name (`_vmaf.json` or extension removed).
pub fn artifact_stem_of(name: &str) -> &str {
    let base = basename(name);
    base.strip_suffix(QUALITY_SUFFIX)
        .unwrap_or_else(|| strip_extension(base))
}

pub fn parse_artifact_name(name: &str) -> Option<ParsedArtifactName> {
    let caps = artifact_regex()?.captures(name)?;
    let width = caps.name("width")?.as_str().parse().ok()?;
    let height = caps.name("height")?.as_str().parse().ok()?;
    let bitrate = caps.name("bitrate")?.as_str().parse().ok()?;

    let mut variables = Variables::new();
    if let Some(raw) = caps.name("variables") {
        // "_A_1_B_2" splits into ["", "A", "1", "B", "2"]; names and values never contain '_'.
        let parts: Vec<&str> = raw.as_str().split('_').skip(1).collect();
        for chunk in parts.chunks(2) {
            if let [name, value] = chunk {
                variables.insert((*name).to_string(), (*value).to_string());
            }
        }
    }

    Some(ParsedArtifactName {
        resolution: Resolution::new(width, height),
        bitrate,
        variables,
    })
}

pub fn basename(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

/// Everything before the final `/`, or `""` for a bare name.
pub fn dirname(location: &str) -> &str {
    location.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

pub fn strip_extension(name: &str) -> &str {
    let base_start = name.len() - basename(name).len();
    match name[base_start..].rfind('.') {
        Some(dot) if dot > 0 => &name[..base_start + dot],
        _ => name,
    }
}
