//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zyme.
//! The Zyme project belongs to the Dunimd project team.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value};
use zyme::capability::{ZyBudget, ZyObjective};
use zyme::config::{ZyContainerConfig, ZyEngineConfig};
use zyme::container::*;
use zyme::engine::{ZyDesignBlock, ZyExecutionEngine, ZyOptimizeBlock};
use zyme::orbit::*;
use zyme::{Result, ZyError};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Behavior {
    Succeed,
    Exit(i64),
    Hang,
}

/// In-memory daemon. `run` plays the plugin: it reads `request.json` from
/// the mounted scratch directory and writes `outputs/result.json`.
#[derive(Debug)]
struct FakeRuntime {
    available: bool,
    images: BTreeSet<String>,
    behavior: Behavior,
    requests: Mutex<Vec<Value>>,
    specs: Mutex<Vec<ZyContainerRunSpec>>,
    runs: AtomicUsize,
    removes: AtomicUsize,
}

impl FakeRuntime {
    fn new(behavior: Behavior) -> Self {
        FakeRuntime {
            available: true,
            images: ["zyme/fold:1".to_string(), "zyme/opt:1".to_string()]
                .into_iter()
                .collect(),
            behavior,
            requests: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
            runs: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    fn offline() -> Self {
        FakeRuntime {
            available: false,
            ..Self::new(Behavior::Succeed)
        }
    }

    fn respond(request: &Value, scratch: &PathBuf) -> Value {
        let arguments = &request["arguments"];
        match request["method"].as_str().unwrap_or_default() {
            "generate" => {
                let count = arguments["count"].as_u64().unwrap_or(1);
                let structure = arguments["parameters"]["structure"].clone();
                let candidates: Vec<Value> = (0..count)
                    .map(|i| {
                        json!({
                            "sequence": "MKTAYIAKQR",
                            "confidence": 0.9,
                            "properties": {"plddt": 80.0 + i as f64},
                            "metadata": {"structure": structure}
                        })
                    })
                    .collect();
                json!({ "candidates": candidates })
            }
            "suggest_next" => {
                let n = arguments["history"].as_array().map_or(0, Vec::len);
                json!({ "parameters": {"x": n} })
            }
            "evaluate" => {
                let x = arguments["parameters"]["x"].as_f64().unwrap_or_default();
                fs::write(scratch.join("outputs").join("trace.txt"), "ok").unwrap();
                json!({ "objective_value": x * 2.0, "metrics": {"runtime_s": 1.5} })
            }
            other => json!({ "error": other }),
        }
    }
}

impl ZyContainerRuntime for FakeRuntime {
    fn is_available(&self) -> bool {
        self.available
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.images.contains(image))
    }

    fn run(&self, spec: &ZyContainerRunSpec) -> Result<String> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());

        let scratch = spec.mounts[0].0.clone();
        let request: Value =
            serde_json::from_str(&fs::read_to_string(scratch.join("request.json"))?)?;
        if self.behavior == Behavior::Succeed {
            let result = Self::respond(&request, &scratch);
            fs::write(
                scratch.join("outputs").join("result.json"),
                serde_json::to_vec(&result)?,
            )?;
        }
        self.requests.lock().unwrap().push(request);
        Ok(format!("c{}", n))
    }

    fn wait(&self, _id: &str, _timeout: Duration) -> Result<Option<i64>> {
        match self.behavior {
            Behavior::Succeed => Ok(Some(0)),
            Behavior::Exit(code) => Ok(Some(code)),
            Behavior::Hang => Ok(None),
        }
    }

    fn logs(&self, id: &str) -> Result<String> {
        Ok(format!("{}: model checkpoint missing", id))
    }

    fn remove(&self, _id: &str) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn executor(runtime: &Arc<FakeRuntime>) -> ZyContainerExecutor {
    ZyContainerExecutor::new(runtime.clone(), ZyContainerConfig::default())
}

fn engine(runtime: &Arc<FakeRuntime>) -> ZyExecutionEngine {
    let mut registry = ZyPluginRegistry::new();
    let table = ZyDiscoveryTable::builtin()
        .with_image("fold", "zyme/fold:1")
        .with_image("remote_opt", "zyme/opt:1")
        .with_image("random_sequence", "zyme/fold:1")
        .with_image("random_search", "zyme/absent:0");
    assert!(registry.discover(&table).is_clean());
    ZyExecutionEngine::new(Arc::new(Mutex::new(registry)), ZyEngineConfig::default())
        .with_container_executor(executor(runtime))
}

fn design(model: &str, count: usize) -> ZyDesignBlock {
    ZyDesignBlock {
        entity: "ProteinSequence".to_string(),
        model: model.to_string(),
        objective: ZyObjective::Maximize("plddt".to_string()),
        count,
        constraints: vec![],
        output: "folds".to_string(),
        length: Some(10),
        parameters: Map::new(),
    }
}

#[test]
fn test_container_generator_round_trip_removes_container() {
    let runtime = Arc::new(FakeRuntime::new(Behavior::Succeed));
    let candidates = engine(&runtime).execute_design(&design("fold", 3)).unwrap();

    assert_eq!(candidates.len(), 3);
    assert_eq!(candidates[2].property_f64("plddt"), Some(82.0));
    assert_eq!(runtime.runs.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 1);

    let spec = runtime.specs.lock().unwrap()[0].clone();
    assert_eq!(spec.image, "zyme/fold:1");
    assert_eq!(spec.workdir, "/workspace");
    assert_eq!(spec.env["ZYME_METHOD"], "generate");
    assert_eq!(spec.env["ZYME_REQUEST"], "/workspace/request.json");
    // The scratch directory is gone after the call.
    assert!(!spec.mounts[0].0.exists());
}

#[test]
fn test_non_zero_exit_carries_logs_and_removes_container() {
    let runtime = Arc::new(FakeRuntime::new(Behavior::Exit(137)));
    match engine(&runtime).execute_design(&design("fold", 1)) {
        Err(ZyError::ContainerExit { image, exit_code, logs }) => {
            assert_eq!(image, "zyme/fold:1");
            assert_eq!(exit_code, 137);
            assert!(logs.contains("checkpoint missing"));
        }
        other => panic!("expected ContainerExit, got {:?}", other),
    }
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_timeout_removes_container() {
    let runtime = Arc::new(FakeRuntime::new(Behavior::Hang));
    let request = ZyContainerRequest::new("zyme/fold:1", "generate", json!({"count": 1}));
    match executor(&runtime).execute(&request) {
        Err(ZyError::ContainerTimeout { image, timeout_secs }) => {
            assert_eq!(image, "zyme/fold:1");
            assert_eq!(timeout_secs, ZyContainerConfig::default().wait_timeout_secs);
        }
        other => panic!("expected ContainerTimeout, got {:?}", other),
    }
    assert_eq!(runtime.runs.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unavailable_daemon_falls_back_to_local_plugin() {
    let runtime = Arc::new(FakeRuntime::offline());
    let engine = engine(&runtime);

    let candidates = engine.execute_design(&design("random_sequence", 2)).unwrap();
    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].property_f64("hydrophobicity").is_some());
    assert_eq!(runtime.runs.load(Ordering::SeqCst), 0);

    // Without a local registration there is nothing to fall back to.
    assert!(matches!(
        engine.execute_design(&design("fold", 1)),
        Err(ZyError::ContainerUnavailable(_))
    ));
}

#[test]
fn test_missing_image_falls_back_for_registered_optimizer() {
    let runtime = Arc::new(FakeRuntime::new(Behavior::Succeed));
    let block = ZyOptimizeBlock {
        name: None,
        search_space: [("x".to_string(), "range(1, 3)".to_string())]
            .into_iter()
            .collect(),
        strategy: serde_json::from_value(json!({"name": "random_search", "seed": 9})).unwrap(),
        objective: ZyObjective::Minimize("loss".to_string()),
        budget: Some(ZyBudget::new(2)),
        run: json!({"objective_value": "{{x}}"}).as_object().cloned().unwrap(),
    };

    let outcome = engine(&runtime).execute_optimize(&block).unwrap();
    assert_eq!(outcome.history.len(), 2);
    assert!(outcome.history.iter().all(|r| r.success));
    assert_eq!(runtime.runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_container_optimizer_suggests_and_evaluates() {
    let runtime = Arc::new(FakeRuntime::new(Behavior::Succeed));
    let block = ZyOptimizeBlock {
        name: Some("remote".to_string()),
        search_space: [("x".to_string(), "range(0, 100)".to_string())]
            .into_iter()
            .collect(),
        strategy: serde_json::from_value(json!({"name": "remote_opt"})).unwrap(),
        objective: ZyObjective::Maximize("score".to_string()),
        budget: Some(ZyBudget::new(3)),
        run: json!({"assay": "binding"}).as_object().cloned().unwrap(),
    };

    let outcome = engine(&runtime).execute_optimize(&block).unwrap();
    let values: Vec<Option<f64>> = outcome.history.iter().map(|r| r.objective_value).collect();
    assert_eq!(values, vec![Some(0.0), Some(2.0), Some(4.0)]);
    assert_eq!(outcome.history[1].metrics.get("runtime_s"), Some(&1.5));
    assert_eq!(outcome.best.map(|b| b.index), Some(2));

    assert_eq!(runtime.runs.load(Ordering::SeqCst), 6);
    assert_eq!(runtime.removes.load(Ordering::SeqCst), 6);

    let requests = runtime.requests.lock().unwrap();
    assert_eq!(requests[1]["method"], "evaluate");
    assert_eq!(requests[1]["arguments"]["run"]["assay"], "binding");
    assert_eq!(requests[1]["arguments"]["run"]["x"], 0);
}

#[test]
fn test_inputs_are_mounted_and_outputs_copied_back() {
    let runtime = Arc::new(FakeRuntime::new(Behavior::Succeed));
    let host = tempfile::tempdir().unwrap();
    let input = host.path().join("target.pdb");
    fs::write(&input, "ATOM").unwrap();
    let out_dir = host.path().join("results");

    let input_str = input.to_string_lossy().into_owned();
    let request = ZyContainerRequest::new(
        "zyme/opt:1",
        "evaluate",
        json!({"parameters": {"x": 4, "structure": input_str}}),
    )
    .with_input(&input)
    .with_output("trace.txt", &out_dir);

    let response = executor(&runtime).execute(&request).unwrap();
    assert_eq!(response.result["objective_value"], json!(8.0));
    assert!(response.logs.contains("checkpoint"));
    assert_eq!(response.outputs, vec![out_dir.join("trace.txt")]);
    assert_eq!(fs::read_to_string(out_dir.join("trace.txt")).unwrap(), "ok");

    let sent = runtime.requests.lock().unwrap()[0].clone();
    assert_eq!(
        sent["arguments"]["parameters"]["structure"],
        json!("/workspace/inputs/target.pdb")
    );
}

#[test]
fn test_missing_image_and_disabled_backend() {
    let runtime = Arc::new(FakeRuntime::new(Behavior::Succeed));
    let request = ZyContainerRequest::new("zyme/absent:0", "generate", json!({}));
    assert!(matches!(
        executor(&runtime).execute(&request),
        Err(ZyError::ContainerImageNotFound { .. })
    ));

    let disabled = ZyContainerExecutor::new(
        runtime.clone(),
        ZyContainerConfig {
            enabled: false,
            ..ZyContainerConfig::default()
        },
    );
    assert!(!disabled.is_available());
    let err = disabled.execute(&request).unwrap_err();
    assert!(err.is_container_fallback());
    assert_eq!(runtime.runs.load(Ordering::SeqCst), 0);
}
