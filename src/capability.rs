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

//! # Capability Contracts
//!
//! The closed set of capabilities a plugin can provide:
//!
//! - [`ZyGenerator`]: produces candidate biological entities for a design block
//! - [`ZyOptimizer`]: proposes experiment parameters for an optimize block

pub mod design;
pub mod optimizer;
pub mod search_space;

pub use design::{ZyDesignCandidate, ZyDesignRequest, ZyGenerator, ZyObjective};
pub use optimizer::{
    best_result, should_stop, ZyBudget, ZyEvaluation, ZyExperimentResult, ZyOptimizationSession,
    ZyOptimizationStep, ZyOptimizer, ZyOptimizerSetup, ZyStopReason,
};
pub use search_space::{ZyParameterDomain, ZySearchSpace};
