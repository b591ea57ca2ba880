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


//! # Zyme Core Library
//!
//! Plugin orchestration and execution runtime for computational-biology
//! workflows. A workflow declares `design` blocks, which generate candidate
//! biological entities, and `optimize` blocks, which iteratively search
//! experiment parameters. Both are served by plugins.
//!
//! ## Module Overview
//!
//! - **orbit**: plugin descriptors, registry, lifecycle and discovery
//! - **capability**: generator and optimizer contracts, search spaces
//! - **dag**: priority-aware dependency ordering used by the registry
//! - **engine**: workflow AST, template substitution and block execution
//! - **staging**: per-run download of remote input files
//! - **container**: file-based request/response protocol for containerized plugins
//! - **plugins**: built-in generator and optimizers
//! - **config**: engine configuration and builders
//!
//! ## Feature Flags
//!
//! - `pool`: bounded concurrent execution of independent workflows (tokio)
//! - `full`: enables all features
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//! use zyme::{ZyDiscoveryTable, ZyEngineConfig, ZyExecutionEngine, ZyPluginRegistry, ZyWorkflow};
//!
//! let mut registry = ZyPluginRegistry::new();
//! let report = registry.discover(&ZyDiscoveryTable::builtin());
//! assert!(report.is_clean());
//!
//! let engine = ZyExecutionEngine::new(Arc::new(Mutex::new(registry)), ZyEngineConfig::default());
//! let workflow = ZyWorkflow::from_yaml_str(source)?;
//! let result = engine.execute_workflow(&workflow)?;
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, ZyError>`. Per-file staging failures and
//! per-experiment failures are recorded and logged rather than aborting a run.

pub mod capability;
pub mod config;
pub mod container;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod orbit;
pub mod plugins;
pub mod staging;

pub use errors::{Result, ZyError};

pub use capability::{
    ZyBudget, ZyDesignCandidate, ZyDesignRequest, ZyEvaluation, ZyExperimentResult, ZyGenerator,
    ZyObjective, ZyOptimizationSession, ZyOptimizationStep, ZyOptimizer, ZyOptimizerSetup,
    ZyParameterDomain, ZySearchSpace, ZyStopReason,
};
pub use config::{
    ZyContainerConfig, ZyContainerConfigBuilder, ZyEngineConfig, ZyEngineConfigBuilder,
    ZyOptimizeConfig, ZyOptimizeConfigBuilder, ZyStagingConfig, ZyStagingConfigBuilder,
};
pub use container::{
    ZyContainerExecutor, ZyContainerRequest, ZyContainerResponse, ZyContainerRunSpec,
    ZyContainerRuntime, ZyDockerCliRuntime,
};
pub use dag::{ZyDependencyGraph, ZyGraphNode, ZyNodeId, ZyOrdering};
pub use engine::{
    ZyDesignBlock, ZyExecutionEngine, ZyOptimizationOutcome, ZyOptimizeBlock, ZyStrategy,
    ZyWorkflow, ZyWorkflowBlock, ZyWorkflowResult,
};
#[cfg(feature = "pool")]
pub use engine::ZyWorkflowPool;
pub use orbit::{
    ZyCapabilityKind, ZyDiscoveryCandidate, ZyDiscoveryOutcome, ZyDiscoveryReport,
    ZyDiscoveryTable, ZyPluginDependency, ZyPluginDescriptor, ZyPluginFactory, ZyPluginHooks,
    ZyPluginInfo, ZyPluginInstance, ZyPluginPriority, ZyPluginRegistry, ZyPluginState,
    ZyPluginVersion, ZyVersionConstraint,
};
pub use staging::{ZyDataStagingManager, ZyFileFetcher, ZyHttpFetcher, ZyStagedFile};
