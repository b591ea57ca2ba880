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

//! # Optimizer Capability
//!
//! Optimizer plugins are shared singletons, so `setup` returns a per-run
//! [`ZyOptimizationSession`] that owns the immutable configuration. The
//! session's `suggest_next` depends only on the experiment history it is
//! given; the engine owns the history and decides when to stop via
//! [`should_stop`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::design::ZyObjective;
use crate::capability::search_space::ZySearchSpace;
use crate::errors::{Result, ZyError};
use crate::orbit::plugin::ZyPluginHooks;

/// Number of trailing results inspected by the convergence check.
pub const CONVERGENCE_WINDOW: usize = 3;

fn default_max_experiments() -> usize {
    10
}

/// Termination budget of an optimize block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyBudget {
    #[serde(default = "default_max_experiments")]
    pub max_experiments: usize,
    #[serde(default)]
    pub convergence_threshold: Option<f64>,
}

impl Default for ZyBudget {
    fn default() -> Self {
        ZyBudget {
            max_experiments: default_max_experiments(),
            convergence_threshold: None,
        }
    }
}

impl ZyBudget {
    pub fn new(max_experiments: usize) -> Self {
        ZyBudget {
            max_experiments,
            convergence_threshold: None,
        }
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = Some(threshold);
        self
    }
}

/// Outcome of a single sub-experiment. Failed experiments carry no objective
/// value and an error message instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyExperimentResult {
    pub index: usize,
    pub parameters: Map<String, Value>,
    pub objective_value: Option<f64>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ZyExperimentResult {
    pub fn succeeded(
        index: usize,
        parameters: Map<String, Value>,
        objective_value: f64,
        metrics: BTreeMap<String, f64>,
    ) -> Self {
        ZyExperimentResult {
            index,
            parameters,
            objective_value: Some(objective_value),
            metrics,
            success: true,
            error: None,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(index: usize, parameters: Map<String, Value>, error: impl Into<String>) -> Self {
        ZyExperimentResult {
            index,
            parameters,
            objective_value: None,
            metrics: BTreeMap::new(),
            success: false,
            error: Some(error.into()),
            completed_at: Utc::now(),
        }
    }

    /// Objective value of a successful experiment.
    pub fn value(&self) -> Option<f64> {
        if self.success {
            self.objective_value
        } else {
            None
        }
    }
}

/// Parameters proposed for the next experiment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZyOptimizationStep {
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ZyOptimizationStep {
    pub fn new(parameters: Map<String, Value>) -> Self {
        ZyOptimizationStep {
            parameters,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Plugin-side evaluation of a run template.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyEvaluation {
    pub objective_value: f64,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl ZyEvaluation {
    pub fn new(objective_value: f64) -> Self {
        ZyEvaluation {
            objective_value,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

/// Immutable configuration handed to `ZyOptimizer::setup`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyOptimizerSetup {
    pub search_space: ZySearchSpace,
    /// Strategy options other than the strategy name.
    #[serde(default)]
    pub strategy: Map<String, Value>,
    pub objective: ZyObjective,
    pub budget: ZyBudget,
}

impl ZyOptimizerSetup {
    pub fn option_f64(&self, key: &str) -> Option<f64> {
        self.strategy.get(key).and_then(Value::as_f64)
    }

    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.strategy.get(key).and_then(Value::as_u64)
    }
}

/// Why the optimize loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZyStopReason {
    BudgetExhausted,
    Converged,
    Cancelled,
}

impl fmt::Display for ZyStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZyStopReason::BudgetExhausted => f.write_str("budget_exhausted"),
            ZyStopReason::Converged => f.write_str("converged"),
            ZyStopReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-run optimizer state.
pub trait ZyOptimizationSession: Send + fmt::Debug {
    /// Propose the next parameters. Must be a function of `history` only and
    /// produce a space-filling sample when `history` is empty.
    fn suggest_next(&self, history: &[ZyExperimentResult]) -> Result<ZyOptimizationStep>;

    /// Score a run template that does not name a generator model.
    fn evaluate(&self, parameters: &Map<String, Value>, run: &Map<String, Value>) -> Result<ZyEvaluation> {
        let _ = (parameters, run);
        Err(ZyError::validation(
            "optimizer does not evaluate runs; name a generator model in the run template",
        ))
    }
}

/// Capability contract for plugins that drive iterative parameter search.
pub trait ZyOptimizer: ZyPluginHooks + Send + Sync + fmt::Debug {
    fn setup(&self, setup: &ZyOptimizerSetup) -> Result<Box<dyn ZyOptimizationSession>>;
}

/// Engine-side termination check.
///
/// Stops when the history reaches `max_experiments`, or when a convergence
/// threshold is set and the last three results all succeeded with objective
/// values spanning at most that threshold.
pub fn should_stop(history: &[ZyExperimentResult], budget: &ZyBudget) -> Option<ZyStopReason> {
    if history.len() >= budget.max_experiments {
        return Some(ZyStopReason::BudgetExhausted);
    }

    let threshold = budget.convergence_threshold?;
    if history.len() < CONVERGENCE_WINDOW {
        return None;
    }

    let window = &history[history.len() - CONVERGENCE_WINDOW..];
    let values: Option<Vec<f64>> = window.iter().map(ZyExperimentResult::value).collect();
    let values = values?;

    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if max - min <= threshold {
        Some(ZyStopReason::Converged)
    } else {
        None
    }
}

/// Best successful result under the objective. Ties keep the earliest.
pub fn best_result<'a>(
    history: &'a [ZyExperimentResult],
    objective: &ZyObjective,
) -> Option<&'a ZyExperimentResult> {
    let mut best: Option<(&ZyExperimentResult, f64)> = None;
    for result in history {
        let Some(value) = result.value() else { continue };
        match best {
            Some((_, incumbent)) if !objective.is_better(value, incumbent) => {}
            _ => best = Some((result, value)),
        }
    }
    best.map(|(r, _)| r)
}
