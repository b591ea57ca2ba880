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

//! Validated workflow AST consumed by the execution engine.
//!
//! ```yaml
//! name: stable_binders
//! files:
//!   target.pdb: https://bucket.example/target.pdb?sig=...
//! blocks:
//!   - design:
//!       entity: ProteinSequence
//!       model: random_sequence
//!       objective: {maximize: stability}
//!       count: 5
//!       output: binders
//!       parameters: {structure: target.pdb}
//!   - optimize:
//!       search_space: {temperature: "range(20, 40)"}
//!       strategy: {name: local_search, step: 0.2}
//!       objective: {maximize: confidence}
//!       budget: {max_experiments: 8}
//!       run: {model: random_sequence, entity: ProteinSequence, length: "{{temperature}}"}
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{ZyBudget, ZyObjective};
use crate::errors::{Result, ZyError};

fn default_count() -> usize {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyDesignBlock {
    pub entity: String,
    pub model: String,
    pub objective: ZyObjective,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Workflow state variable receiving the candidates.
    pub output: String,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyStrategy {
    pub name: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyOptimizeBlock {
    #[serde(default)]
    pub name: Option<String>,
    pub search_space: BTreeMap<String, String>,
    pub strategy: ZyStrategy,
    pub objective: ZyObjective,
    /// Engine defaults apply when omitted.
    #[serde(default)]
    pub budget: Option<ZyBudget>,
    #[serde(default)]
    pub run: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZyWorkflowBlock {
    Design(ZyDesignBlock),
    Optimize(ZyOptimizeBlock),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZyWorkflow {
    #[serde(default)]
    pub name: Option<String>,
    /// Logical file name to (signed) URL.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub blocks: Vec<ZyWorkflowBlock>,
}

impl ZyWorkflow {
    pub fn from_json_str(source: &str) -> Result<Self> {
        let workflow: ZyWorkflow = serde_json::from_str(source)?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self> {
        let workflow: ZyWorkflow = serde_yaml::from_str(source)?;
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "json" => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Name of the optimize block at `index`, defaulting to `optimize_<index>`.
    pub fn optimize_name(block: &ZyOptimizeBlock, index: usize) -> String {
        block
            .name
            .clone()
            .unwrap_or_else(|| format!("optimize_{}", index))
    }

    /// Structural checks the front end may not have performed.
    pub fn validate(&self) -> Result<()> {
        let mut outputs = BTreeMap::new();
        for (index, block) in self.blocks.iter().enumerate() {
            match block {
                ZyWorkflowBlock::Design(design) => {
                    if design.model.trim().is_empty() {
                        return Err(ZyError::validation(format!(
                            "design block {} has an empty model",
                            index
                        )));
                    }
                    if design.output.trim().is_empty() {
                        return Err(ZyError::validation(format!(
                            "design block {} has an empty output",
                            index
                        )));
                    }
                    if let Some(previous) = outputs.insert(design.output.clone(), index) {
                        return Err(ZyError::validation(format!(
                            "design blocks {} and {} both write output '{}'",
                            previous, index, design.output
                        )));
                    }
                }
                ZyWorkflowBlock::Optimize(optimize) => {
                    if optimize.strategy.name.trim().is_empty() {
                        return Err(ZyError::validation(format!(
                            "optimize block {} has an empty strategy name",
                            index
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
