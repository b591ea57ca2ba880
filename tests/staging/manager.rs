//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zyme.
//! The Zyme project belongs to the Dunimd project team.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use zyme::config::{ZyEngineConfigBuilder, ZyStagingConfig, ZyStagingConfigBuilder};
use zyme::staging::{ZyDataStagingManager, ZyFileFetcher};
use zyme::{Result, ZyError};

/// Serves fixed bodies by URL; unknown URLs fail after writing a partial file.
#[derive(Debug, Default)]
struct MemoryFetcher {
    bodies: BTreeMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl MemoryFetcher {
    fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }
}

impl ZyFileFetcher for MemoryFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.bodies.get(url) {
            Some(body) => {
                std::fs::write(dest, body)?;
                Ok(body.len() as u64)
            }
            None => {
                std::fs::write(dest, b"partial")?;
                Err(ZyError::Io(format!("403 Forbidden for {}", url)))
            }
        }
    }
}

fn obj(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

fn manifest(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_stage_files_rewrites_manifest_references() {
    let fetcher = Arc::new(MemoryFetcher::default().with("https://store/f.txt?sig=1", b"ACGT\n"));
    let mut manager = ZyDataStagingManager::new(&ZyStagingConfig::default(), fetcher.clone()).unwrap();
    let dir = manager.temp_dir().unwrap().to_path_buf();

    let out = manager.stage_files(
        &obj(json!({"a": "f.txt", "b": "not-a-file", "c": 5})),
        &manifest(&[("f.txt", "https://store/f.txt?sig=1")]),
    );

    let staged_path = dir.join("f.txt");
    assert_eq!(out["a"], json!(staged_path.to_string_lossy()));
    assert_eq!(out["b"], json!("not-a-file"));
    assert_eq!(out["c"], json!(5));
    assert_eq!(std::fs::read(&staged_path).unwrap(), b"ACGT\n");

    let staged = manager.staged_files();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].bytes, 5);
    assert_eq!(staged[0].digest, blake3::hash(b"ACGT\n").to_hex().to_string());
}

#[test]
fn test_non_string_params_pass_through_with_empty_manifest() {
    let fetcher = Arc::new(MemoryFetcher::default());
    let mut manager = ZyDataStagingManager::new(&ZyStagingConfig::default(), fetcher.clone()).unwrap();

    let params = obj(json!({"a": 5, "nested": {"f": "f.txt"}}));
    assert_eq!(manager.stage_files(&params, &BTreeMap::new()), params);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_repeated_reference_downloads_once() {
    let fetcher = Arc::new(MemoryFetcher::default().with("u", b"x"));
    let mut manager = ZyDataStagingManager::new(&ZyStagingConfig::default(), fetcher.clone()).unwrap();
    let files = manifest(&[("ref.pdb", "u")]);

    let first = manager.stage_files(&obj(json!({"a": "ref.pdb", "b": "ref.pdb"})), &files);
    let second = manager.stage_files(&obj(json!({"c": "ref.pdb"})), &files);

    assert_eq!(first["a"], first["b"]);
    assert_eq!(first["a"], second["c"]);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_download_keeps_value_and_cleanup_still_removes_dir() {
    let fetcher = Arc::new(MemoryFetcher::default().with("good", b"ok"));
    let mut manager = ZyDataStagingManager::new(&ZyStagingConfig::default(), fetcher).unwrap();
    let dir = manager.temp_dir().unwrap().to_path_buf();

    let out = manager.stage_files(
        &obj(json!({"bad": "expired.pdb", "good": "good.txt"})),
        &manifest(&[("expired.pdb", "expired"), ("good.txt", "good")]),
    );
    assert_eq!(out["bad"], json!("expired.pdb"));
    assert!(!dir.join("expired.pdb").exists());
    assert!(dir.join("good.txt").exists());

    assert!(matches!(
        manager.stage_file("expired.pdb", "expired"),
        Err(ZyError::Staging { .. })
    ));

    manager.cleanup();
    assert!(!dir.exists());
    assert!(manager.temp_dir().is_none());
    manager.cleanup();
}

#[test]
fn test_run_directory_uses_configured_root_and_prefix() {
    let root = tempfile::tempdir().unwrap();
    let config = ZyEngineConfigBuilder {
        staging: ZyStagingConfigBuilder {
            root_dir: Some(root.path().join("runs")),
            dir_prefix: Some("assay-".to_string()),
            download_timeout_secs: None,
        },
        ..Default::default()
    }
    .build()
    .staging;

    let dir = {
        let manager = ZyDataStagingManager::new(&config, Arc::new(MemoryFetcher::default())).unwrap();
        let dir = manager.temp_dir().unwrap().to_path_buf();
        assert!(dir.starts_with(root.path().join("runs")));
        assert!(dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("assay-"));
        dir
    };
    assert!(!dir.exists());
}

#[test]
fn test_same_basename_in_different_names_stays_separate() {
    let fetcher = Arc::new(
        MemoryFetcher::default()
            .with("https://store/a", b"alpha")
            .with("https://store/b", b"beta"),
    );
    let mut manager = ZyDataStagingManager::new(&ZyStagingConfig::default(), fetcher).unwrap();

    let out = manager.stage_files(
        &obj(json!({"x": "a/data.csv", "y": "b/data.csv", "z": "c/data.csv"})),
        &manifest(&[
            ("a/data.csv", "https://store/a"),
            ("b/data.csv", "https://store/b"),
            ("c/data.csv", "https://store/expired"),
        ]),
    );

    let px = out["x"].as_str().unwrap();
    let py = out["y"].as_str().unwrap();
    assert_ne!(px, py);
    assert!(px.ends_with("data.csv"));
    assert!(py.ends_with("data.csv"));
    assert_eq!(out["z"], json!("c/data.csv"));

    // The failed download must not touch files staged for other names.
    assert_eq!(std::fs::read(px).unwrap(), b"alpha");
    assert_eq!(std::fs::read(py).unwrap(), b"beta");
    assert_eq!(manager.staged_files().len(), 2);
}
