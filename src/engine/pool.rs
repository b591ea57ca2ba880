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

//! Bounded concurrent execution of independent workflows.
//!
//! Each workflow runs on the blocking thread pool with its own staging
//! directory; the shared registry is only locked for plugin resolution.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::engine::ast::ZyWorkflow;
use crate::engine::executor::{ZyExecutionEngine, ZyWorkflowResult};
use crate::errors::{Result, ZyError};

#[derive(Clone, Debug)]
pub struct ZyWorkflowPool {
    engine: Arc<ZyExecutionEngine>,
    max_parallelism: usize,
}

impl ZyWorkflowPool {
    pub fn new(engine: Arc<ZyExecutionEngine>) -> Self {
        ZyWorkflowPool {
            engine,
            max_parallelism: num_cpus::get().max(1),
        }
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism.max(1);
        self
    }

    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Run all workflows, at most `max_parallelism` at a time. Results keep
    /// the input order.
    pub async fn run_all(&self, workflows: Vec<ZyWorkflow>) -> Vec<Result<ZyWorkflowResult>> {
        let permits = Arc::new(Semaphore::new(self.max_parallelism));
        log::info!(
            "engine.pool.start: running workflows - count={}, max_parallelism={}",
            workflows.len(),
            self.max_parallelism
        );

        let tasks = workflows.into_iter().map(|workflow| {
            let permits = Arc::clone(&permits);
            let engine = Arc::clone(&self.engine);
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ZyError::internal(format!("workflow pool closed: {}", e)))?;
                let name = workflow.display_name().to_string();
                tokio::task::spawn_blocking(move || engine.execute_workflow(&workflow))
                    .await
                    .map_err(|e| ZyError::internal(format!("workflow '{}' task failed: {}", name, e)))?
            }
        });

        join_all(tasks).await
    }
}
