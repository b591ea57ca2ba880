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


//! # Workflow Engine
//!
//! Interprets a validated workflow AST: design blocks call generator plugins,
//! optimize blocks run a suggest/evaluate loop against an optimizer plugin.

pub mod ast;
pub mod executor;
#[cfg(feature = "pool")]
pub mod pool;
pub mod template;

pub use ast::{ZyDesignBlock, ZyOptimizeBlock, ZyStrategy, ZyWorkflow, ZyWorkflowBlock};
pub use executor::{ZyExecutionEngine, ZyOptimizationOutcome, ZyWorkflowResult};
#[cfg(feature = "pool")]
pub use pool::ZyWorkflowPool;
pub use template::substitute;
