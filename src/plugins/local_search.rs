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

//! Local search: random sampling until one experiment succeeds, then
//! perturbation of the best result so far.
//!
//! Options: `step` (fraction of each range width, default 0.1) and `seed`.

use std::sync::Arc;

use rand::Rng;
use serde_json::{Map, Value};

use crate::capability::{
    best_result, ZyEvaluation, ZyExperimentResult, ZyOptimizationSession, ZyOptimizationStep,
    ZyOptimizer, ZyOptimizerSetup, ZyParameterDomain,
};
use crate::errors::{Result, ZyError};
use crate::orbit::plugin::{ZyPluginDescriptor, ZyPluginHooks, ZyPluginInstance};
use crate::plugins::{history_rng, template_evaluation};

pub const NAME: &str = "local_search";
pub const ENTRY_POINT: &str = "zyme.local_search";

const DEFAULT_STEP: f64 = 0.1;
const CHOICE_SWITCH_PROBABILITY: f64 = 0.2;

#[derive(Debug, Default)]
pub struct ZyLocalSearchOptimizer;

impl ZyLocalSearchOptimizer {
    pub fn descriptor() -> ZyPluginDescriptor {
        ZyPluginDescriptor::optimizer(NAME).with_description("perturbation around the incumbent")
    }

    pub fn factory() -> Result<ZyPluginInstance> {
        Ok(ZyPluginInstance::Optimizer(Arc::new(ZyLocalSearchOptimizer)))
    }
}

impl ZyPluginHooks for ZyLocalSearchOptimizer {}

impl ZyOptimizer for ZyLocalSearchOptimizer {
    fn setup(&self, setup: &ZyOptimizerSetup) -> Result<Box<dyn ZyOptimizationSession>> {
        if setup.search_space.is_empty() {
            return Err(ZyError::validation("local_search needs a non-empty search space"));
        }
        let step = setup.option_f64("step").unwrap_or(DEFAULT_STEP);
        if !(step > 0.0 && step <= 1.0) {
            return Err(ZyError::validation(format!(
                "local_search step must be in (0, 1], got {}",
                step
            )));
        }
        Ok(Box::new(ZyLocalSearchSession {
            setup: setup.clone(),
            step,
        }))
    }
}

#[derive(Debug)]
struct ZyLocalSearchSession {
    setup: ZyOptimizerSetup,
    step: f64,
}

impl ZyOptimizationSession for ZyLocalSearchSession {
    fn suggest_next(&self, history: &[ZyExperimentResult]) -> Result<ZyOptimizationStep> {
        let mut rng = history_rng(&self.setup, history);

        let Some(best) = best_result(history, &self.setup.objective) else {
            let parameters = self.setup.search_space.sample(&mut rng);
            return Ok(ZyOptimizationStep::new(parameters).with_note("initial random sample"));
        };

        let mut parameters = Map::new();
        for (name, domain) in &self.setup.search_space.parameters {
            let current = best.parameters.get(name).filter(|v| domain.contains(v));
            let value = match (domain, current) {
                (_, None) => domain.sample(&mut rng),
                (ZyParameterDomain::Range { low, high, .. }, Some(v)) => {
                    let width = (high - low) * self.step;
                    let base = v.as_f64().unwrap_or(*low);
                    let delta = if width > 0.0 { rng.gen_range(-width..=width) } else { 0.0 };
                    domain.clamp(base + delta)
                }
                (ZyParameterDomain::Choice(_), Some(v)) => {
                    if rng.gen_bool(CHOICE_SWITCH_PROBABILITY) {
                        domain.sample(&mut rng)
                    } else {
                        v.clone()
                    }
                }
            };
            parameters.insert(name.clone(), value);
        }

        Ok(ZyOptimizationStep::new(parameters)
            .with_note(format!("perturbation of experiment {}", best.index)))
    }

    fn evaluate(&self, _parameters: &Map<String, Value>, run: &Map<String, Value>) -> Result<ZyEvaluation> {
        template_evaluation(run)
    }
}
