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

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::capability::{
    ZyEvaluation, ZyExperimentResult, ZyOptimizationSession, ZyOptimizationStep, ZyOptimizer,
    ZyOptimizerSetup,
};
use crate::errors::{Result, ZyError};
use crate::orbit::plugin::{ZyPluginDescriptor, ZyPluginHooks, ZyPluginInstance};
use crate::plugins::{history_rng, template_evaluation};

pub const NAME: &str = "random_search";
pub const ENTRY_POINT: &str = "zyme.random_search";

/// Uniform sampling of the search space.
#[derive(Debug, Default)]
pub struct ZyRandomSearchOptimizer;

impl ZyRandomSearchOptimizer {
    pub fn descriptor() -> ZyPluginDescriptor {
        ZyPluginDescriptor::optimizer(NAME).with_description("uniform random search")
    }

    pub fn factory() -> Result<ZyPluginInstance> {
        Ok(ZyPluginInstance::Optimizer(Arc::new(ZyRandomSearchOptimizer)))
    }
}

impl ZyPluginHooks for ZyRandomSearchOptimizer {}

impl ZyOptimizer for ZyRandomSearchOptimizer {
    fn setup(&self, setup: &ZyOptimizerSetup) -> Result<Box<dyn ZyOptimizationSession>> {
        if setup.search_space.is_empty() {
            return Err(ZyError::validation("random_search needs a non-empty search space"));
        }
        Ok(Box::new(ZyRandomSearchSession {
            setup: setup.clone(),
        }))
    }
}

#[derive(Debug)]
struct ZyRandomSearchSession {
    setup: ZyOptimizerSetup,
}

impl ZyOptimizationSession for ZyRandomSearchSession {
    fn suggest_next(&self, history: &[ZyExperimentResult]) -> Result<ZyOptimizationStep> {
        let mut rng = history_rng(&self.setup, history);
        let parameters = self.setup.search_space.sample(&mut rng);
        Ok(ZyOptimizationStep::new(parameters).with_note("random sample"))
    }

    fn evaluate(&self, _parameters: &Map<String, Value>, run: &Map<String, Value>) -> Result<ZyEvaluation> {
        template_evaluation(run)
    }
}
