//! Probed bitrate from a metadata sidecar (ffprobe JSON).

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeEntry>,
    // Sidecars written by older tooling used a singular key.
    #[serde(default)]
    stream: Vec<ProbeEntry>,
    #[serde(default)]
    format: Option<ProbeEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeEntry {
    #[serde(default)]
    bit_rate: Option<Value>,
}

fn as_bitrate(v: &Option<Value>) -> Option<u64> {
    match v.as_ref()? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// First stream's `bit_rate`, falling back to the container `bit_rate`.
pub fn parse_probed_bitrate(bytes: &[u8]) -> Result<Option<u64>, serde_json::Error> {
    let report: ProbeReport = serde_json::from_slice(bytes)?;
    let first = report.streams.first().or_else(|| report.stream.first());
    Ok(first
        .and_then(|s| as_bitrate(&s.bit_rate))
        .or_else(|| report.format.as_ref().and_then(|f| as_bitrate(&f.bit_rate))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_string_or_numeric_bitrates() {
        assert_eq!(
            parse_probed_bitrate(br#"{"streams":[{"codec_type":"video","bit_rate":"1987654"}]}"#).unwrap(),
            Some(1_987_654)
        );
        assert_eq!(parse_probed_bitrate(br#"{"stream":[{"bit_rate":600123}]}"#).unwrap(), Some(600_123));
        assert_eq!(
            parse_probed_bitrate(br#"{"streams":[{}],"format":{"bit_rate":"700000"}}"#).unwrap(),
            Some(700_000)
        );
        assert_eq!(parse_probed_bitrate(br#"{}"#).unwrap(), None);
    }
}
