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

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Result;
use crate::orbit::plugin::ZyPluginHooks;

/// What a design or optimize block optimizes for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZyObjective {
    Maximize(String),
    Minimize(String),
    Target { metric: String, value: f64 },
}

impl ZyObjective {
    pub fn metric(&self) -> &str {
        match self {
            ZyObjective::Maximize(m) | ZyObjective::Minimize(m) => m,
            ZyObjective::Target { metric, .. } => metric,
        }
    }

    /// Map an objective value onto a scale where larger is always better.
    pub fn score(&self, value: f64) -> f64 {
        match self {
            ZyObjective::Maximize(_) => value,
            ZyObjective::Minimize(_) => -value,
            ZyObjective::Target { value: target, .. } => -(value - target).abs(),
        }
    }

    pub fn is_better(&self, candidate: f64, incumbent: f64) -> bool {
        self.score(candidate) > self.score(incumbent)
    }
}

impl fmt::Display for ZyObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZyObjective::Maximize(m) => write!(f, "maximize {}", m),
            ZyObjective::Minimize(m) => write!(f, "minimize {}", m),
            ZyObjective::Target { metric, value } => write!(f, "target {}={}", metric, value),
        }
    }
}

/// Everything a generator receives for a single `generate` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZyDesignRequest {
    pub entity: String,
    pub objective: ZyObjective,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub count: usize,
    #[serde(default)]
    pub length: Option<usize>,
    /// Extra block parameters, with staged files already rewritten to local paths.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl ZyDesignRequest {
    pub fn new(entity: impl Into<String>, objective: ZyObjective, count: usize) -> Self {
        ZyDesignRequest {
            entity: entity.into(),
            objective,
            constraints: Vec::new(),
            count,
            length: None,
            parameters: Map::new(),
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }
}

/// A generated biological entity. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyDesignCandidate {
    sequence: String,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
    confidence: f64,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

impl ZyDesignCandidate {
    pub fn new(sequence: impl Into<String>, confidence: f64) -> Self {
        ZyDesignCandidate {
            sequence: sequence.into(),
            properties: BTreeMap::new(),
            confidence,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn property_f64(&self, name: &str) -> Option<f64> {
        self.properties.get(name).and_then(Value::as_f64)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }
}

/// Capability contract for plugins that generate candidate entities.
///
/// Implementations are shared singletons and must not keep per-run mutable
/// state. `generate` must return exactly `request.count` candidates or fail.
pub trait ZyGenerator: ZyPluginHooks + Send + Sync + fmt::Debug {
    fn generate(&self, request: &ZyDesignRequest) -> Result<Vec<ZyDesignCandidate>>;
}
