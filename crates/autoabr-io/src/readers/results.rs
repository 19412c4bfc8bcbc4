//! Bulk loading of quality results from a store.

use autoabr_core::naming::{
    artifact_stem_of, basename, cpu_time_file_name, dirname, join, metadata_location,
    parse_artifact_name, METADATA_SUFFIX,
};
use autoabr_core::QualityResult;
use tracing::{debug, info, warn};

use super::{parse_cpu_time, parse_probed_bitrate, parse_scores};
use crate::error::{Error, Result};
use crate::storage::ArtifactStore;

#[derive(Debug, Default, Clone)]
pub struct LoadedResults {
    pub results: Vec<QualityResult>,
    /// Artifacts that were skipped (unparsable name or contents).
    pub rejected: Vec<String>,
}

fn is_result_candidate(location: &str) -> bool {
    location.ends_with(".json") && !location.ends_with(METADATA_SUFFIX)
}

/// Load every result artifact directly inside `prefix` (one model directory).
pub async fn load_results(store: &dyn ArtifactStore, prefix: &str) -> Result<LoadedResults> {
    let root = store.uri_for(prefix.trim_end_matches('/'));
    let listed = store.list(prefix).await?;
    info!(prefix = %root, artifacts = listed.len(), "loading quality results");

    let selected: Vec<String> = listed
        .into_iter()
        .filter(|loc| {
            let uri = store.uri_for(loc);
            uri == root || dirname(&uri) == root
        })
        .filter(|loc| is_result_candidate(loc))
        .collect();
    load_artifacts(store, &selected).await
}

/// Load an exact set of result artifacts.
///
/// An artifact that cannot be read or parsed is listed in `rejected`; only
/// the listing in [`load_results`] can fail the whole load.
pub async fn load_artifacts(store: &dyn ArtifactStore, locations: &[String]) -> Result<LoadedResults> {
    let mut loaded = LoadedResults::default();
    for location in locations {
        match load_one(store, location).await {
            Ok(result) => loaded.results.push(result),
            Err(e) => {
                warn!(artifact = %location, error = %e, "quality artifact rejected");
                loaded.rejected.push(location.clone());
            }
        }
    }
    debug!(
        loaded = loaded.results.len(),
        rejected = loaded.rejected.len(),
        "quality results loaded"
    );
    Ok(loaded)
}

fn malformed(location: &str, reason: impl ToString) -> Error {
    Error::Malformed {
        location: location.to_string(),
        reason: reason.to_string(),
    }
}

async fn load_one(store: &dyn ArtifactStore, location: &str) -> Result<QualityResult> {
    let parsed = parse_artifact_name(basename(location))
        .ok_or_else(|| malformed(location, "no resolution and bitrate in the name"))?;

    let bytes = store.read(location).await?;
    let scores = parse_scores(&bytes).map_err(|e| malformed(location, e))?;

    let actual_bitrate = match read_sidecar(store, &metadata_location(location)).await {
        Some(bytes) => parse_probed_bitrate(&bytes).unwrap_or_else(|e| {
            warn!(artifact = %location, error = %e, "malformed metadata sidecar");
            None
        }),
        None => None,
    };

    let cpu_time = match read_cpu_time_sidecar(store, location).await {
        Some(bytes) => match parse_cpu_time(&bytes) {
            Ok(t) => Some(t),
            Err(e) => {
                warn!(artifact = %location, error = %e, "malformed cpu-time sidecar");
                None
            }
        },
        None => None,
    };

    Ok(QualityResult {
        source_filename: location.to_string(),
        resolution: parsed.resolution,
        target_bitrate: parsed.bitrate,
        variables: parsed.variables,
        scores,
        actual_bitrate,
        cpu_time,
    })
}

/// Sidecars are optional: a missing or unreadable one yields `None`.
async fn read_sidecar(store: &dyn ArtifactStore, location: &str) -> Option<Vec<u8>> {
    match store.read(location).await {
        Ok(bytes) => Some(bytes),
        Err(Error::NotFound(_)) => None,
        Err(e) => {
            warn!(sidecar = %location, error = %e, "unreadable sidecar ignored");
            None
        }
    }
}

/// Next to the result first, then one directory up (variants live above the model directories).
async fn read_cpu_time_sidecar(store: &dyn ArtifactStore, location: &str) -> Option<Vec<u8>> {
    let name = cpu_time_file_name(artifact_stem_of(location));
    let dir = dirname(location);
    if let Some(bytes) = read_sidecar(store, &join(dir, &name)).await {
        return Some(bytes);
    }
    let found = read_sidecar(store, &join(dirname(dir), &name)).await;
    if found.is_none() {
        debug!(artifact = %location, "no cpu-time sidecar");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage::MemoryStore;
    use autoabr_core::{Resolution, ScoreFamily};

    fn vmaf(score: f64) -> Vec<u8> {
        format!(r#"{{"pooled_metrics":{{"vmaf":{{"harmonic_mean":{score}}}}}}}"#).into_bytes()
    }

    #[tokio::test]
    async fn attaches_sidecars_and_skips_bad_names() {
        let store = MemoryStore::new();
        store.insert("job/HD/1280x720_2000000_vmaf.json", vmaf(88.0));
        store.insert("job/HD/1280x720_2000000_metadata.json", br#"{"streams":[{"bit_rate":"1950000"}]}"#.to_vec());
        store.insert(
            "job/1280x720_2000000.mp4.pass1-cpu-time.txt",
            br#"{"realTime":3.0,"cpuUserMode":5.5,"cpuKernelMode":0.25}"#.to_vec(),
        );
        store.insert("job/HD/summary.json", b"{}".to_vec());
        store.insert("job/HD/nested/640x360_150000_vmaf.json", vmaf(40.0));

        let loaded = load_results(&store, "job/HD").await.unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.rejected, vec!["job/HD/summary.json".to_string()]);

        let r = &loaded.results[0];
        assert_eq!(r.resolution, Resolution::new(1280, 720));
        assert_eq!(r.target_bitrate, 2_000_000);
        assert_eq!(r.score(ScoreFamily::Vmaf), Some(88.0));
        assert_eq!(r.actual_bitrate, Some(1_950_000));
        assert_eq!(r.cpu_time.map(|t| t.cpu_time), Some(5.75));
    }

    #[tokio::test]
    async fn malformed_contents_are_rejected_not_fatal() {
        let store = MemoryStore::new();
        store.insert("r/640x360_150000_vmaf.json", b"{oops".to_vec());
        store.insert("r/640x360_300000_vmaf.json", vmaf(50.0));
        let loaded = load_artifacts(
            &store,
            &["r/640x360_150000_vmaf.json".to_string(), "r/640x360_300000_vmaf.json".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.rejected.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_sidecars_do_not_fail_the_load() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        let first = format!("{root}/1280x720_1000000_vmaf.json");
        let second = format!("{root}/1280x720_2000000_vmaf.json");
        std::fs::write(&first, vmaf(80.0)).unwrap();
        std::fs::write(&second, vmaf(90.0)).unwrap();
        // A directory where the metadata sidecar should be cannot be read as a file.
        std::fs::create_dir(format!("{root}/1280x720_1000000_metadata.json")).unwrap();
        std::fs::create_dir(format!("{root}/1280x720_1000000.mp4.pass1-cpu-time.txt")).unwrap();

        let loaded = load_artifacts(&crate::FsStore::new(), &[first.clone(), second]).await.unwrap();
        assert_eq!(loaded.results.len(), 2);
        assert!(loaded.rejected.is_empty());
        let r = loaded.results.iter().find(|r| r.source_filename == first).unwrap();
        assert_eq!(r.actual_bitrate, None);
        assert!(r.cpu_time.is_none());
    }

    #[tokio::test]
    async fn unreadable_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        let good = format!("{root}/640x360_300000_vmaf.json");
        let unreadable = format!("{root}/640x360_150000_vmaf.json");
        std::fs::write(&good, vmaf(50.0)).unwrap();
        std::fs::create_dir(&unreadable).unwrap();

        let loaded = load_artifacts(&crate::FsStore::new(), &[unreadable.clone(), good]).await.unwrap();
        assert_eq!(loaded.results.len(), 1);
        assert_eq!(loaded.rejected, vec![unreadable]);
    }
}
