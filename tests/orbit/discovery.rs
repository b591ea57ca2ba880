//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zyme.
//! The Zyme project belongs to the Dunimd project team.

use std::fs;
use std::path::Path;

use zyme::orbit::*;

fn write_manifest(root: &Path, dir: &str, file: &str, body: &str) {
    let plugin_dir = root.join(dir);
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::write(plugin_dir.join(file), body).unwrap();
}

#[test]
fn test_builtin_table_registers_every_plugin() {
    let mut registry = ZyPluginRegistry::new();
    let report = registry.discover(&ZyDiscoveryTable::builtin());

    assert!(report.is_clean());
    assert_eq!(report.registered().len(), 3);
    assert_eq!(
        registry.names_by_kind(ZyCapabilityKind::Generator),
        vec!["random_sequence"]
    );
    let optimizers = registry.names_by_kind(ZyCapabilityKind::Optimizer);
    assert!(optimizers.contains(&"random_search".to_string()));
    assert!(optimizers.contains(&"local_search".to_string()));
    assert!(registry
        .names()
        .iter()
        .all(|n| registry.state(n) == Some(ZyPluginState::Unloaded)));
}

#[test]
fn test_failing_candidate_does_not_stop_discovery() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(
        root.path(),
        "a_sampler",
        "zyme_plugin.yaml",
        "name: sampler\nversion: 2.1.0\nkind: optimizer\npriority: high\nentry_point: zyme.random_search\n",
    );
    write_manifest(
        root.path(),
        "b_broken",
        "zyme_plugin.json",
        r#"{"name": "broken", "kind": "sequencer", "entry_point": "zyme.random_search"}"#,
    );
    write_manifest(
        root.path(),
        "c_ghost",
        "zyme_plugin.json",
        r#"{"name": "ghost", "kind": "generator", "entry_point": "vendor.missing"}"#,
    );
    write_manifest(
        root.path(),
        "d_folding",
        "zyme_plugin.json",
        r#"{"name": "folding", "kind": "generator", "entry_point": "zyme.random_sequence",
            "container_image": "zyme/folding:1.0",
            "dependencies": [{"name": "sampler", "version": ">=2.0.0"}]}"#,
    );
    fs::create_dir_all(root.path().join("e_empty")).unwrap();

    let table = ZyDiscoveryTable::builtin()
        .with_entry(ZyPluginDescriptor::generator("orphan"), "vendor.nothing")
        .with_image("remote_fold", "zyme/remote-fold:3")
        .with_search_path(root.path())
        .with_search_path(root.path().join("does-not-exist"));

    let mut registry = ZyPluginRegistry::new();
    let report = registry.discover(&table);

    let registered = report.registered();
    assert!(registered.contains(&"sampler"));
    assert!(registered.contains(&"folding"));
    assert!(registered.contains(&"random_sequence"));

    let failed: Vec<Option<&str>> = report.failed().iter().map(|c| c.name.as_deref()).collect();
    assert_eq!(failed.len(), 3);
    assert!(failed.contains(&Some("orphan")));
    assert!(failed.contains(&Some("ghost")));
    assert!(failed.contains(&None));
    assert!(!report.is_clean());

    let skipped = report
        .candidates
        .iter()
        .filter(|c| matches!(c.outcome, ZyDiscoveryOutcome::Skipped(_)))
        .count();
    assert_eq!(skipped, 2);

    assert!(!registry.contains("broken"));
    assert!(!registry.contains("ghost"));
    assert_eq!(
        registry.info("sampler").map(|i| i.descriptor.version.to_string()),
        Some("2.1.0".to_string())
    );
    assert_eq!(
        registry.container_image("folding").as_deref(),
        Some("zyme/folding:1.0")
    );
    assert_eq!(registry.container_only_names(), vec!["remote_fold"]);

    // The manifest-declared dependency resolves against the discovered plugin.
    assert!(registry.validate_plugin_dependencies().is_empty());
    assert!(registry.generator("folding").is_ok());
    assert_eq!(registry.state("sampler"), Some(ZyPluginState::Loaded));
}

#[test]
fn test_manifest_does_not_replace_registered_plugin() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(
        root.path(),
        "shadow",
        "zyme_plugin.json",
        r#"{"name": "random_sequence", "version": "9.0.0", "kind": "generator", "entry_point": "zyme.random_sequence"}"#,
    );

    let mut registry = ZyPluginRegistry::new();
    let report = registry.discover(&ZyDiscoveryTable::builtin().with_search_path(root.path()));

    let shadow = report
        .candidates
        .iter()
        .find(|c| c.source.ends_with("shadow"))
        .unwrap();
    assert!(matches!(shadow.outcome, ZyDiscoveryOutcome::Skipped(_)));
    assert_ne!(
        registry
            .info("random_sequence")
            .map(|i| i.descriptor.version.to_string()),
        Some("9.0.0".to_string())
    );
}

#[test]
fn test_report_serializes_outcomes() {
    let mut registry = ZyPluginRegistry::new();
    let table = ZyDiscoveryTable::new().with_entry(ZyPluginDescriptor::generator("x"), "nowhere");
    let report = registry.discover(&table);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["candidates"][0]["outcome"]["status"], "failed");
    assert_eq!(json["candidates"][0]["source"], "table:nowhere");
}
