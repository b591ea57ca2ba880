//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Zyme.
//! The Zyme project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Execution Engine
//!
//! Interprets design and optimize blocks against an injected plugin registry.
//!
//! ## Backend selection
//!
//! When a plugin name is mapped to a container image and the container
//! backend is enabled and reachable, the call runs in a container. If that
//! fails because the daemon or the image is missing, the engine falls back to
//! the in-process plugin. A name with an image but no local registration runs
//! in the container only.
//!
//! ## Locking
//!
//! The registry lock is held only to resolve plugins; generator and optimizer
//! calls run without it.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{
    best_result, should_stop, ZyBudget, ZyDesignCandidate, ZyDesignRequest, ZyEvaluation,
    ZyExperimentResult, ZyGenerator, ZyObjective, ZyOptimizationSession, ZyOptimizationStep,
    ZyOptimizerSetup, ZySearchSpace, ZyStopReason,
};
use crate::config::ZyEngineConfig;
use crate::container::{ZyContainerExecutor, ZyDockerCliRuntime};
use crate::engine::ast::{ZyDesignBlock, ZyOptimizeBlock, ZyWorkflow, ZyWorkflowBlock};
use crate::engine::template;
use crate::errors::{panic_message, Result, ZyError};
use crate::orbit::plugin::ZyCapabilityKind;
use crate::orbit::registry::ZyPluginRegistry;
use crate::staging::{ZyDataStagingManager, ZyFileFetcher, ZyHttpFetcher};

/// Run-template keys consumed by the engine when a run names a `model`.
const RUN_KEYS: [&str; 5] = ["model", "entity", "count", "length", "constraints"];

/// Result of one optimize block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZyOptimizationOutcome {
    pub strategy: String,
    pub history: Vec<ZyExperimentResult>,
    pub best: Option<ZyExperimentResult>,
    pub stop_reason: ZyStopReason,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZyWorkflowResult {
    /// Design outputs by output variable.
    pub workflow_state: BTreeMap<String, Vec<ZyDesignCandidate>>,
    /// Design results by block output name.
    pub design: BTreeMap<String, Vec<ZyDesignCandidate>>,
    /// Optimize results by block name.
    pub optimize: BTreeMap<String, ZyOptimizationOutcome>,
}

/// Optimizer session delegating to a container image, with an optional
/// in-process session used when the backend turns out to be unusable.
#[derive(Debug)]
struct ZyContainerSession {
    executor: ZyContainerExecutor,
    image: String,
    setup: ZyOptimizerSetup,
    local: Option<Box<dyn ZyOptimizationSession>>,
}

impl ZyContainerSession {
    fn fallback<T>(
        &self,
        method: &str,
        remote: Result<T>,
        local: impl FnOnce(&dyn ZyOptimizationSession) -> Result<T>,
    ) -> Result<T> {
        match remote {
            Err(e) if e.is_container_fallback() => match &self.local {
                Some(session) => {
                    log::warn!(
                        "engine.container.fallback: running optimizer locally - image={}, method={}, error={}",
                        self.image,
                        method,
                        e
                    );
                    local(session.as_ref())
                }
                None => Err(e),
            },
            other => other,
        }
    }
}

impl ZyOptimizationSession for ZyContainerSession {
    fn suggest_next(&self, history: &[ZyExperimentResult]) -> Result<ZyOptimizationStep> {
        let remote = self.executor.suggest_next(&self.image, &self.setup, history);
        self.fallback("suggest_next", remote, |s| s.suggest_next(history))
    }

    fn evaluate(&self, parameters: &Map<String, Value>, run: &Map<String, Value>) -> Result<ZyEvaluation> {
        let remote = self.executor.evaluate(&self.image, parameters, run);
        self.fallback("evaluate", remote, |s| s.evaluate(parameters, run))
    }
}

/// Context shared by the blocks of one workflow run.
struct ZyRunContext<'a> {
    staging: Option<&'a mut ZyDataStagingManager>,
    files: &'a BTreeMap<String, String>,
}

impl ZyRunContext<'_> {
    fn stage(&mut self, params: &Map<String, Value>) -> Map<String, Value> {
        match self.staging.as_deref_mut() {
            Some(manager) => manager.stage_files(params, self.files),
            None => params.clone(),
        }
    }

    /// Local paths of staged files that `params` refers to.
    fn inputs(&self, params: &Map<String, Value>) -> Vec<PathBuf> {
        let Some(manager) = self.staging.as_deref() else {
            return Vec::new();
        };
        manager
            .staged_files()
            .into_iter()
            .filter(|f| {
                let path = f.local_path.to_string_lossy();
                params.values().any(|v| v.as_str() == Some(&*path))
            })
            .map(|f| f.local_path.clone())
            .collect()
    }
}

#[derive(Debug)]
pub struct ZyExecutionEngine {
    registry: Arc<Mutex<ZyPluginRegistry>>,
    config: ZyEngineConfig,
    container: Option<ZyContainerExecutor>,
    fetcher: Option<Arc<dyn ZyFileFetcher>>,
    cancelled: Arc<AtomicBool>,
}

impl ZyExecutionEngine {
    pub fn new(registry: Arc<Mutex<ZyPluginRegistry>>, config: ZyEngineConfig) -> Self {
        ZyExecutionEngine {
            registry,
            config,
            container: None,
            fetcher: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_container_executor(mut self, executor: ZyContainerExecutor) -> Self {
        self.container = Some(executor);
        self
    }

    /// Container backend driving the configured CLI binary.
    pub fn with_docker(self) -> Self {
        let runtime = Arc::new(ZyDockerCliRuntime::new(self.config.container.binary.clone()));
        let executor = ZyContainerExecutor::new(runtime, self.config.container.clone());
        self.with_container_executor(executor)
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ZyFileFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn registry(&self) -> Arc<Mutex<ZyPluginRegistry>> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &ZyEngineConfig {
        &self.config
    }

    /// Request cooperative cancellation. Checked between blocks and between
    /// optimization iterations.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn reset_cancellation(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ZyPluginRegistry>> {
        self.registry
            .lock()
            .map_err(|_| ZyError::internal("plugin registry lock poisoned"))
    }

    /// Create a run-scoped staging manager.
    pub fn staging_manager(&self) -> Result<ZyDataStagingManager> {
        let fetcher: Arc<dyn ZyFileFetcher> = match &self.fetcher {
            Some(f) => Arc::clone(f),
            None => Arc::new(ZyHttpFetcher::new(Duration::from_secs(
                self.config.staging.download_timeout_secs,
            ))?),
        };
        ZyDataStagingManager::new(&self.config.staging, fetcher)
    }

    /// Run every block in declaration order. The run's staging directory is
    /// removed on every exit path.
    pub fn execute_workflow(&self, workflow: &ZyWorkflow) -> Result<ZyWorkflowResult> {
        log::info!(
            "engine.workflow.start: workflow started - workflow={}, blocks={}, files={}",
            workflow.display_name(),
            workflow.blocks.len(),
            workflow.files.len()
        );

        let mut staging = if workflow.files.is_empty() {
            None
        } else {
            Some(self.staging_manager()?)
        };

        let outcome = {
            let mut ctx = ZyRunContext {
                staging: staging.as_mut(),
                files: &workflow.files,
            };
            self.run_blocks(workflow, &mut ctx)
        };

        if let Some(manager) = staging.as_mut() {
            manager.cleanup();
        }

        match &outcome {
            Ok(result) => log::info!(
                "engine.workflow.done: workflow finished - workflow={}, designs={}, optimizations={}",
                workflow.display_name(),
                result.design.len(),
                result.optimize.len()
            ),
            Err(e) => log::error!(
                "engine.workflow.failed: workflow failed - workflow={}, error={}",
                workflow.display_name(),
                e
            ),
        }
        outcome
    }

    fn run_blocks(&self, workflow: &ZyWorkflow, ctx: &mut ZyRunContext<'_>) -> Result<ZyWorkflowResult> {
        let mut result = ZyWorkflowResult::default();
        for (index, block) in workflow.blocks.iter().enumerate() {
            if self.is_cancelled() {
                return Err(ZyError::execution(
                    workflow.display_name(),
                    format!("cancelled before block {}", index),
                    vec![],
                ));
            }
            match block {
                ZyWorkflowBlock::Design(design) => {
                    let candidates = self.design_block(design, ctx)?;
                    result
                        .workflow_state
                        .insert(design.output.clone(), candidates.clone());
                    result.design.insert(design.output.clone(), candidates);
                }
                ZyWorkflowBlock::Optimize(optimize) => {
                    let name = ZyWorkflow::optimize_name(optimize, index);
                    let outcome = self.optimize_block(&name, optimize, ctx)?;
                    result.optimize.insert(name, outcome);
                }
            }
        }
        Ok(result)
    }

    /// Run a single design block without file staging.
    pub fn execute_design(&self, block: &ZyDesignBlock) -> Result<Vec<ZyDesignCandidate>> {
        let files = BTreeMap::new();
        let mut ctx = ZyRunContext {
            staging: None,
            files: &files,
        };
        self.design_block(block, &mut ctx)
    }

    /// Run a single optimize block without file staging.
    pub fn execute_optimize(&self, block: &ZyOptimizeBlock) -> Result<ZyOptimizationOutcome> {
        let files = BTreeMap::new();
        let mut ctx = ZyRunContext {
            staging: None,
            files: &files,
        };
        let name = ZyWorkflow::optimize_name(block, 0);
        self.optimize_block(&name, block, &mut ctx)
    }

    fn design_block(&self, block: &ZyDesignBlock, ctx: &mut ZyRunContext<'_>) -> Result<Vec<ZyDesignCandidate>> {
        let parameters = ctx.stage(&block.parameters);
        let inputs = ctx.inputs(&parameters);
        let request = ZyDesignRequest {
            entity: block.entity.clone(),
            objective: block.objective.clone(),
            constraints: block.constraints.clone(),
            count: block.count,
            length: block.length,
            parameters,
        };

        log::info!(
            "engine.design.start: design block started - model={}, entity={}, count={}, output={}",
            block.model,
            block.entity,
            block.count,
            block.output
        );
        let candidates = self.generate(&block.model, &request, &inputs)?;
        log::info!(
            "engine.design.done: design block finished - model={}, output={}, candidates={}",
            block.model,
            block.output,
            candidates.len()
        );
        Ok(candidates)
    }

    /// Resolve `model` and generate exactly `request.count` candidates.
    fn generate(
        &self,
        model: &str,
        request: &ZyDesignRequest,
        inputs: &[PathBuf],
    ) -> Result<Vec<ZyDesignCandidate>> {
        let (image, registered) = {
            let registry = self.lock()?;
            (registry.container_image(model), registry.contains(model))
        };

        let mut candidates = None;
        if let Some(image) = image {
            match self.container.as_ref().filter(|c| c.is_available()) {
                Some(container) => match container.generate(&image, request, inputs) {
                    Ok(out) => candidates = Some(out),
                    Err(e) if e.is_container_fallback() && registered => log::warn!(
                        "engine.container.fallback: running generator locally - model={}, image={}, error={}",
                        model,
                        image,
                        e
                    ),
                    Err(e) => return Err(e),
                },
                None if registered => log::warn!(
                    "engine.container.fallback: container backend unavailable, running generator locally - model={}, image={}",
                    model,
                    image
                ),
                None => {
                    return Err(ZyError::ContainerUnavailable(format!(
                        "model '{}' is only available as image '{}'",
                        model, image
                    )))
                }
            }
        }

        let candidates = match candidates {
            Some(c) => c,
            None => self.resolve_generator(model)?.generate(request)?,
        };

        if candidates.len() != request.count {
            return Err(ZyError::execution(
                model,
                format!(
                    "generator returned {} candidates, expected {}",
                    candidates.len(),
                    request.count
                ),
                vec![],
            ));
        }
        Ok(candidates)
    }

    fn resolve_generator(&self, model: &str) -> Result<Arc<dyn ZyGenerator>> {
        let mut registry = self.lock()?;
        let is_generator = registry
            .info(model)
            .map_or(false, |info| info.descriptor.kind == ZyCapabilityKind::Generator);
        if !is_generator {
            let mut available = registry.names_by_kind(ZyCapabilityKind::Generator);
            available.extend(registry.container_only_names());
            return Err(ZyError::execution(model, "unknown generator model", available));
        }
        let generator = registry.generator(model)?;
        registry.activate(model)?;
        Ok(generator)
    }

    fn open_session(&self, strategy: &str, setup: &ZyOptimizerSetup) -> Result<Box<dyn ZyOptimizationSession>> {
        let (image, registered) = {
            let registry = self.lock()?;
            (registry.container_image(strategy), registry.contains(strategy))
        };

        if let Some(image) = image {
            match self.container.as_ref().filter(|c| c.is_available()) {
                Some(container) => {
                    let local = if registered {
                        Some(self.local_session(strategy, setup)?)
                    } else {
                        None
                    };
                    return Ok(Box::new(ZyContainerSession {
                        executor: container.clone(),
                        image,
                        setup: setup.clone(),
                        local,
                    }));
                }
                None if registered => log::warn!(
                    "engine.container.fallback: container backend unavailable, running optimizer locally - strategy={}, image={}",
                    strategy,
                    image
                ),
                None => {
                    return Err(ZyError::ContainerUnavailable(format!(
                        "strategy '{}' is only available as image '{}'",
                        strategy, image
                    )))
                }
            }
        }

        self.local_session(strategy, setup)
    }

    fn local_session(&self, strategy: &str, setup: &ZyOptimizerSetup) -> Result<Box<dyn ZyOptimizationSession>> {
        let optimizer = {
            let mut registry = self.lock()?;
            let is_optimizer = registry
                .info(strategy)
                .map_or(false, |info| info.descriptor.kind == ZyCapabilityKind::Optimizer);
            if !is_optimizer {
                return Err(ZyError::execution(
                    strategy,
                    "unknown optimization strategy",
                    registry.names_by_kind(ZyCapabilityKind::Optimizer),
                ));
            }
            let optimizer = registry.optimizer(strategy)?;
            registry.activate(strategy)?;
            optimizer
        };
        optimizer.setup(setup)
    }

    fn budget_for(&self, block: &ZyOptimizeBlock) -> ZyBudget {
        let defaults = &self.config.optimize;
        let mut budget = block.budget.clone().unwrap_or_else(|| ZyBudget {
            max_experiments: defaults.default_max_experiments,
            convergence_threshold: None,
        });
        if budget.convergence_threshold.is_none() {
            budget.convergence_threshold = defaults.default_convergence_threshold;
        }
        budget
    }

    fn optimize_block(
        &self,
        name: &str,
        block: &ZyOptimizeBlock,
        ctx: &mut ZyRunContext<'_>,
    ) -> Result<ZyOptimizationOutcome> {
        let budget = self.budget_for(block);
        let setup = ZyOptimizerSetup {
            search_space: ZySearchSpace::parse(&block.search_space)?,
            strategy: block.strategy.options.clone(),
            objective: block.objective.clone(),
            budget: budget.clone(),
        };
        let session = self.open_session(&block.strategy.name, &setup)?;

        log::info!(
            "engine.optimize.start: optimize block started - block={}, strategy={}, objective={}, max_experiments={}",
            name,
            block.strategy.name,
            block.objective,
            budget.max_experiments
        );

        let mut history: Vec<ZyExperimentResult> = Vec::new();
        let stop_reason = loop {
            if let Some(reason) = should_stop(&history, &budget) {
                break reason;
            }
            if self.is_cancelled() {
                break ZyStopReason::Cancelled;
            }
            let result = self.run_experiment(history.len(), session.as_ref(), &history, block, ctx);
            log::debug!(
                "engine.optimize.experiment: experiment finished - block={}, index={}, success={}, objective_value={:?}, error={:?}",
                name,
                result.index,
                result.success,
                result.objective_value,
                result.error
            );
            history.push(result);
        };

        let best = best_result(&history, &block.objective).cloned();
        log::info!(
            "engine.optimize.done: optimize block finished - block={}, experiments={}, stop_reason={}, best_value={:?}",
            name,
            history.len(),
            stop_reason,
            best.as_ref().and_then(|b| b.objective_value)
        );

        Ok(ZyOptimizationOutcome {
            strategy: block.strategy.name.clone(),
            history,
            best,
            stop_reason,
        })
    }

    /// One sub-experiment. Errors and panics become a failed result.
    fn run_experiment(
        &self,
        index: usize,
        session: &dyn ZyOptimizationSession,
        history: &[ZyExperimentResult],
        block: &ZyOptimizeBlock,
        ctx: &mut ZyRunContext<'_>,
    ) -> ZyExperimentResult {
        let mut parameters = Map::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let step = session.suggest_next(history)?;
            parameters = step.parameters.clone();
            let run = template::substitute(&block.run, &step.parameters);
            let run = ctx.stage(&run);
            self.evaluate_run(session, &step.parameters, &run, &block.objective, ctx)
        }));

        match outcome {
            Ok(Ok(eval)) => ZyExperimentResult::succeeded(index, parameters, eval.objective_value, eval.metrics),
            Ok(Err(e)) => ZyExperimentResult::failed(index, parameters, e.to_string()),
            Err(payload) => ZyExperimentResult::failed(
                index,
                parameters,
                format!("experiment panicked: {}", panic_message(payload.as_ref())),
            ),
        }
    }

    fn evaluate_run(
        &self,
        session: &dyn ZyOptimizationSession,
        parameters: &Map<String, Value>,
        run: &Map<String, Value>,
        objective: &ZyObjective,
        ctx: &ZyRunContext<'_>,
    ) -> Result<ZyEvaluation> {
        let Some(model) = run.get("model").and_then(Value::as_str) else {
            return session.evaluate(parameters, run);
        };

        let entity = run
            .get("entity")
            .and_then(Value::as_str)
            .ok_or_else(|| ZyError::validation("run template names a model but no entity"))?;
        let count = match run.get("count") {
            Some(v) => v
                .as_u64()
                .ok_or_else(|| ZyError::validation("run count must be a positive integer"))?
                as usize,
            None => 1,
        };
        let length = match run.get("length") {
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| ZyError::validation("run length must be a positive integer"))?
                    as usize,
            ),
            None => None,
        };
        let constraints: Vec<String> = run
            .get("constraints")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        let extra: Map<String, Value> = run
            .iter()
            .filter(|(k, _)| !RUN_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let request = ZyDesignRequest {
            entity: entity.to_string(),
            objective: objective.clone(),
            constraints,
            count,
            length,
            parameters: extra,
        };
        let inputs = ctx.inputs(run);
        let candidates = self.generate(model, &request, &inputs)?;

        let metric = objective.metric();
        let mut values = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let value = candidate.property_f64(metric).or_else(|| {
                (metric == "confidence").then(|| candidate.confidence())
            });
            match value {
                Some(v) => values.push(v),
                None => {
                    return Err(ZyError::execution(
                        model,
                        format!("candidates do not report metric '{}'", metric),
                        candidate.properties().keys().cloned().collect(),
                    ))
                }
            }
        }
        if values.is_empty() {
            return Err(ZyError::execution(model, "no candidates to score", vec![]));
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let mean_confidence =
            candidates.iter().map(ZyDesignCandidate::confidence).sum::<f64>() / candidates.len() as f64;
        Ok(ZyEvaluation::new(mean)
            .with_metric("candidates", candidates.len() as f64)
            .with_metric("mean_confidence", mean_confidence))
    }
}
