//! First-pass CPU-time sidecar: `{realTime, cpuUserMode, cpuKernelMode}`.

use autoabr_core::CpuTime;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CpuTimeReport {
    real_time: f64,
    cpu_user_mode: f64,
    cpu_kernel_mode: f64,
}

/// `cpu_time` is user plus kernel seconds, rounded to two decimals.
pub fn parse_cpu_time(bytes: &[u8]) -> Result<CpuTime, serde_json::Error> {
    let r: CpuTimeReport = serde_json::from_slice(bytes)?;
    let cpu = ((r.cpu_user_mode + r.cpu_kernel_mode) * 100.0).round() / 100.0;
    Ok(CpuTime {
        real_time: r.real_time,
        cpu_time: cpu,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_and_rounds() {
        let t = parse_cpu_time(br#"{"realTime": 12.5, "cpuUserMode": 40.123, "cpuKernelMode": 1.004}"#).unwrap();
        assert_eq!(t.real_time, 12.5);
        assert_eq!(t.cpu_time, 41.13);
    }
}
