//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zyme.
//! The Zyme project belongs to the Dunimd project team.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};
use zyme::capability::{ZyDesignCandidate, ZyDesignRequest, ZyGenerator, ZyObjective};
use zyme::config::ZyEngineConfig;
use zyme::engine::{ZyDesignBlock, ZyExecutionEngine, ZyWorkflow, ZyWorkflowBlock};
use zyme::orbit::*;
use zyme::staging::ZyFileFetcher;
use zyme::{Result, ZyError};

#[derive(Debug)]
struct ShortGenerator;

impl ZyPluginHooks for ShortGenerator {}

impl ZyGenerator for ShortGenerator {
    fn generate(&self, _request: &ZyDesignRequest) -> Result<Vec<ZyDesignCandidate>> {
        Ok(vec![ZyDesignCandidate::new("MK", 0.7)])
    }
}

/// Echoes the `structure` parameter into each candidate's metadata.
#[derive(Debug)]
struct EchoGenerator;

impl ZyPluginHooks for EchoGenerator {}

impl ZyGenerator for EchoGenerator {
    fn generate(&self, request: &ZyDesignRequest) -> Result<Vec<ZyDesignCandidate>> {
        let structure = request
            .parameters
            .get("structure")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content = std::fs::read_to_string(&structure).unwrap_or_default();
        Ok((0..request.count)
            .map(|_| {
                ZyDesignCandidate::new("MKTAYIAK", 0.8)
                    .with_metadata("structure", structure.clone())
                    .with_metadata("content", content.clone())
            })
            .collect())
    }
}

#[derive(Debug)]
struct StaticFetcher;

impl ZyFileFetcher for StaticFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let body = format!("HEADER from {}\n", url);
        std::fs::write(dest, &body)?;
        Ok(body.len() as u64)
    }
}

fn builtin_engine() -> ZyExecutionEngine {
    let mut registry = ZyPluginRegistry::new();
    assert!(registry.discover(&ZyDiscoveryTable::builtin()).is_clean());
    ZyExecutionEngine::new(Arc::new(Mutex::new(registry)), ZyEngineConfig::default())
}

fn block(model: &str, entity: &str, count: usize) -> ZyDesignBlock {
    ZyDesignBlock {
        entity: entity.to_string(),
        model: model.to_string(),
        objective: ZyObjective::Maximize("stability".to_string()),
        count,
        constraints: vec![],
        output: "designs".to_string(),
        length: None,
        parameters: Map::new(),
    }
}

#[test]
fn test_builtin_generator_returns_requested_count() {
    let engine = builtin_engine();
    let candidates = engine
        .execute_design(&block("random_sequence", "ProteinSequence", 5))
        .unwrap();

    assert_eq!(candidates.len(), 5);
    for candidate in &candidates {
        assert!(!candidate.sequence().is_empty());
        assert_eq!(candidate.sequence().len(), 50);
        assert!(candidate.property_f64("hydrophobicity").is_some());
    }

    let registry = engine.registry();
    let registry = registry.lock().unwrap();
    assert_eq!(registry.state("random_sequence"), Some(ZyPluginState::Active));
}

#[test]
fn test_constraints_and_length_are_honored() {
    let engine = builtin_engine();
    let mut design = block("random_sequence", "DNASequence", 4);
    design.length = Some(30);
    design.constraints = vec!["gc_content >= 0.5".to_string(), "not a constraint".to_string()];

    let candidates = engine.execute_design(&design).unwrap();
    assert_eq!(candidates.len(), 4);
    for candidate in &candidates {
        assert_eq!(candidate.sequence().len(), 30);
        assert!(candidate.property_f64("gc_content").unwrap() >= 0.5);
        assert!(candidate.sequence().chars().all(|c| "ACGT".contains(c)));
    }
}

#[test]
fn test_unknown_model_lists_available_generators() {
    let engine = builtin_engine();
    match engine.execute_design(&block("alphafold_x", "ProteinSequence", 1)) {
        Err(ZyError::Execution { target, available, .. }) => {
            assert_eq!(target, "alphafold_x");
            assert_eq!(available, vec!["random_sequence".to_string()]);
        }
        other => panic!("expected Execution error, got {:?}", other),
    }

    // An optimizer name is not a generator.
    assert!(matches!(
        engine.execute_design(&block("random_search", "ProteinSequence", 1)),
        Err(ZyError::Execution { .. })
    ));
}

#[test]
fn test_unknown_model_also_lists_container_only_models() {
    let mut registry = ZyPluginRegistry::new();
    assert!(registry.discover(&ZyDiscoveryTable::builtin()).is_clean());
    registry.set_container_image("esm_remote", "zyme/esm:1");
    let engine = ZyExecutionEngine::new(Arc::new(Mutex::new(registry)), ZyEngineConfig::default());

    match engine.execute_design(&block("alphafold_x", "ProteinSequence", 1)) {
        Err(ZyError::Execution { available, .. }) => {
            assert_eq!(
                available,
                vec!["random_sequence".to_string(), "esm_remote".to_string()]
            );
        }
        other => panic!("expected Execution error, got {:?}", other),
    }
}

#[test]
fn test_count_mismatch_is_an_error() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register(
            ZyPluginDescriptor::generator("short"),
            ZyPluginInstance::Generator(Arc::new(ShortGenerator)),
        )
        .unwrap();
    let engine = ZyExecutionEngine::new(Arc::new(Mutex::new(registry)), ZyEngineConfig::default());

    let err = engine
        .execute_design(&block("short", "ProteinSequence", 3))
        .unwrap_err();
    assert!(err.to_string().contains("returned 1 candidates, expected 3"));
}

#[test]
fn test_workflow_stages_files_and_cleans_up() {
    let mut registry = ZyPluginRegistry::new();
    registry
        .register(
            ZyPluginDescriptor::generator("echo"),
            ZyPluginInstance::Generator(Arc::new(EchoGenerator)),
        )
        .unwrap();
    let engine = ZyExecutionEngine::new(Arc::new(Mutex::new(registry)), ZyEngineConfig::default())
        .with_fetcher(Arc::new(StaticFetcher));

    let workflow = ZyWorkflow::from_yaml_str(
        r#"
name: binders
files:
  target.pdb: https://bucket.example/target.pdb?sig=abc
blocks:
  - design:
      entity: ProteinSequence
      model: echo
      objective: {maximize: affinity}
      count: 2
      output: binders
      parameters: {structure: target.pdb}
"#,
    )
    .unwrap();

    let result = engine.execute_workflow(&workflow).unwrap();
    let binders = &result.workflow_state["binders"];
    assert_eq!(binders.len(), 2);

    let structure = binders[0].metadata()["structure"].as_str().unwrap().to_string();
    assert!(structure.ends_with("target.pdb"));
    assert_ne!(structure, "target.pdb");
    assert_eq!(
        binders[0].metadata()["content"],
        json!("HEADER from https://bucket.example/target.pdb?sig=abc\n")
    );
    // The run directory is gone once the workflow returns.
    assert!(!Path::new(&structure).exists());
    assert_eq!(result.design["binders"].len(), 2);
}

#[test]
fn test_failing_block_aborts_workflow() {
    let engine = builtin_engine();
    let workflow = ZyWorkflow {
        name: Some("broken".to_string()),
        files: Default::default(),
        blocks: vec![
            ZyWorkflowBlock::Design(block("random_sequence", "RNASequence", 1)),
            ZyWorkflowBlock::Design(ZyDesignBlock {
                output: "second".to_string(),
                ..block("missing_model", "RNASequence", 1)
            }),
        ],
    };
    assert!(matches!(
        engine.execute_workflow(&workflow),
        Err(ZyError::Execution { .. })
    ));
}

#[test]
fn test_cancelled_engine_runs_no_blocks() {
    let engine = builtin_engine();
    engine.cancel();
    let workflow = ZyWorkflow {
        name: None,
        files: Default::default(),
        blocks: vec![ZyWorkflowBlock::Design(block("random_sequence", "DNASequence", 1))],
    };
    assert!(engine.execute_workflow(&workflow).is_err());

    engine.reset_cancellation();
    assert!(engine.execute_workflow(&workflow).is_ok());
}
