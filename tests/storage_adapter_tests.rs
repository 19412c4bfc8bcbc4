//! Choosing a store from an artifact location, and results on an object store.

use std::sync::Arc;

use autoabr_core::config::EngineConfig;
use autoabr_io::readers::load_results;
use autoabr_io::{build_store_for, ArtifactStore, CloudStore, RetryConfig};
use object_store::memory::InMemory;

fn vmaf(score: f64) -> Vec<u8> {
    format!(r#"{{"pooled_metrics":{{"vmaf":{{"harmonic_mean":{score}}}}}}}"#).into_bytes()
}

#[tokio::test]
async fn test_local_locations_use_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("job");
    let cfg = EngineConfig::default().storage_config();

    let (store, prefix) = build_store_for(&root.to_string_lossy(), &cfg).unwrap();
    assert_eq!(prefix, root.to_string_lossy());
    let target = format!("{prefix}/HD/640x360_300000_vmaf.json");
    store.write(&target, vmaf(61.0)).await.unwrap();

    let file_uri = format!("file://{}", root.display());
    let (via_uri, same_prefix) = build_store_for(&file_uri, &cfg).unwrap();
    assert_eq!(same_prefix, prefix);
    assert!(via_uri.exists(&target).await.unwrap());
}

#[test]
fn test_unknown_scheme_is_a_config_error() {
    let cfg = EngineConfig::default().storage_config();
    let err = build_store_for("gs://bucket/results", &cfg).err().unwrap();
    assert!(err.to_string().contains("unsupported scheme 'gs'"), "{err}");
}

#[cfg(not(feature = "s3"))]
#[test]
fn test_s3_location_requires_feature() {
    let cfg = EngineConfig::default().storage_config();
    let err = build_store_for("s3://media/results/job/HD", &cfg).err().unwrap();
    assert!(err.to_string().contains("built without the `s3` feature"), "{err}");
}

#[tokio::test]
async fn test_results_load_from_object_store_uris() {
    let store = CloudStore::new(Arc::new(InMemory::new()), "media", RetryConfig::default());
    store.write("results/job/HD/1920x1080_4500000_vmaf.json", vmaf(90.0)).await.unwrap();
    store
        .write(
            "results/job/HD/1920x1080_4500000_metadata.json",
            br#"{"streams":[{"bit_rate":"4400000"}]}"#.to_vec(),
        )
        .await
        .unwrap();
    store.write("results/job/HD/1280x720_2000000_vmaf.json", vmaf(80.0)).await.unwrap();
    // Another model's results must not leak into this directory's load
    store.write("results/job/HD/old/640x360_150000_vmaf.json", vmaf(30.0)).await.unwrap();
    store.write("results/job/PhoneHD/1280x720_2000000_vmaf.json", vmaf(95.0)).await.unwrap();

    let loaded = load_results(&store, "s3://media/results/job/HD").await.unwrap();
    assert!(loaded.rejected.is_empty());
    let mut names: Vec<&str> = loaded.results.iter().map(|r| r.source_filename.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "s3://media/results/job/HD/1280x720_2000000_vmaf.json",
            "s3://media/results/job/HD/1920x1080_4500000_vmaf.json",
        ]
    );
    let top = loaded.results.iter().find(|r| r.target_bitrate == 4_500_000).unwrap();
    assert_eq!(top.actual_bitrate, Some(4_400_000));
}

#[tokio::test]
async fn test_object_store_copy_and_transfer() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("reference.mov");
    tokio::fs::write(&source, vec![1u8; 10_000]).await.unwrap();

    let store = CloudStore::new(Arc::new(InMemory::new()), "input", RetryConfig::default());
    store.upload_file(&source, "job/reference.mov").await.unwrap();
    store.copy("s3://input/job/reference.mov", "job/backup.mov").await.unwrap();
    assert_eq!(
        store.list("job").await.unwrap(),
        vec!["s3://input/job/backup.mov".to_string(), "s3://input/job/reference.mov".to_string()]
    );

    let back = dir.path().join("restored.mov");
    store.download_file("job/backup.mov", &back).await.unwrap();
    assert_eq!(tokio::fs::read(&back).await.unwrap().len(), 10_000);
}
