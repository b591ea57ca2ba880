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

//! # Built-in Plugins
//!
//! | name              | kind      | entry point            |
//! |-------------------|-----------|------------------------|
//! | `random_sequence` | generator | `zyme.random_sequence` |
//! | `random_search`   | optimizer | `zyme.random_search`   |
//! | `local_search`    | optimizer | `zyme.local_search`    |

pub mod local_search;
pub mod random_search;
pub mod random_sequence;

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};

use crate::capability::{ZyEvaluation, ZyExperimentResult, ZyOptimizerSetup};
use crate::errors::{Result, ZyError};
use crate::orbit::plugin::{ZyPluginDescriptor, ZyPluginFactory};

pub use local_search::ZyLocalSearchOptimizer;
pub use random_search::ZyRandomSearchOptimizer;
pub use random_sequence::ZyRandomSequenceGenerator;

/// `(descriptor, entry point, factory)` of every built-in plugin.
pub fn builtin_entries() -> Vec<(ZyPluginDescriptor, &'static str, ZyPluginFactory)> {
    vec![
        (
            ZyRandomSequenceGenerator::descriptor(),
            random_sequence::ENTRY_POINT,
            ZyRandomSequenceGenerator::factory as ZyPluginFactory,
        ),
        (
            ZyRandomSearchOptimizer::descriptor(),
            random_search::ENTRY_POINT,
            ZyRandomSearchOptimizer::factory as ZyPluginFactory,
        ),
        (
            ZyLocalSearchOptimizer::descriptor(),
            local_search::ENTRY_POINT,
            ZyLocalSearchOptimizer::factory as ZyPluginFactory,
        ),
    ]
}

/// RNG for one suggestion. With a `seed` option the stream is a pure
/// function of the seed and the history length.
pub(crate) fn history_rng(setup: &ZyOptimizerSetup, history: &[ZyExperimentResult]) -> StdRng {
    match setup.option_u64("seed") {
        Some(seed) => {
            let mixed = seed ^ (history.len() as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
            StdRng::seed_from_u64(mixed)
        }
        None => StdRng::from_entropy(),
    }
}

/// Evaluation of a run template that carries its own score: a numeric
/// `objective_value` and an optional object of numeric `metrics`.
pub(crate) fn template_evaluation(run: &Map<String, Value>) -> Result<ZyEvaluation> {
    let objective_value = run
        .get("objective_value")
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .ok_or_else(|| {
            ZyError::validation(
                "run template has no model and no numeric objective_value to evaluate",
            )
        })?;

    let metrics: BTreeMap<String, f64> = run
        .get("metrics")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                .collect()
        })
        .unwrap_or_default();

    Ok(ZyEvaluation {
        objective_value,
        metrics,
    })
}
