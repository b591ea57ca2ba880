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
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::capability::{
    ZyDesignCandidate, ZyDesignRequest, ZyEvaluation, ZyExperimentResult, ZyOptimizationStep,
    ZyOptimizerSetup,
};
use crate::config::ZyContainerConfig;
use crate::container::runtime::{ZyContainerRunSpec, ZyContainerRuntime};
use crate::errors::{Result, ZyError};

pub const REQUEST_FILE: &str = "request.json";
pub const RESULT_FILE: &str = "result.json";

/// One plugin method invocation to run inside a container.
#[derive(Clone, Debug, Default)]
pub struct ZyContainerRequest {
    pub image: String,
    pub method: String,
    pub arguments: Value,
    /// Host files copied into `inputs/`. String arguments equal to one of
    /// these paths are rewritten to the in-container path.
    pub inputs: Vec<PathBuf>,
    /// File names under `outputs/` to copy back into `output_dir`.
    pub outputs: Vec<String>,
    pub output_dir: Option<PathBuf>,
}

impl ZyContainerRequest {
    pub fn new(image: impl Into<String>, method: impl Into<String>, arguments: Value) -> Self {
        ZyContainerRequest {
            image: image.into(),
            method: method.into(),
            arguments,
            ..Default::default()
        }
    }

    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        self.outputs.push(name.into());
        self.output_dir = Some(output_dir.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct ZyContainerResponse {
    /// Parsed `outputs/result.json`.
    pub result: Value,
    pub logs: String,
    /// Host paths of the outputs copied back.
    pub outputs: Vec<PathBuf>,
}

/// Removes the container on every exit path.
struct ZyContainerGuard<'a> {
    runtime: &'a dyn ZyContainerRuntime,
    id: String,
}

impl Drop for ZyContainerGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.runtime.remove(&self.id) {
            log::warn!(
                "container.remove_failed: could not remove container - id={}, error={}",
                self.id,
                e
            );
        }
    }
}

fn rewrite_paths(value: &Value, mapping: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => match mapping.get(s) {
            Some(target) => Value::String(target.clone()),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| rewrite_paths(v, mapping)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), rewrite_paths(v, mapping)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Runs plugin methods out-of-process through a [`ZyContainerRuntime`].
#[derive(Clone, Debug)]
pub struct ZyContainerExecutor {
    runtime: Arc<dyn ZyContainerRuntime>,
    config: ZyContainerConfig,
}

impl ZyContainerExecutor {
    pub fn new(runtime: Arc<dyn ZyContainerRuntime>, config: ZyContainerConfig) -> Self {
        ZyContainerExecutor { runtime, config }
    }

    pub fn config(&self) -> &ZyContainerConfig {
        &self.config
    }

    /// Whether the backend is enabled and the daemon answers.
    pub fn is_available(&self) -> bool {
        self.config.enabled && self.runtime.is_available()
    }

    pub fn execute(&self, request: &ZyContainerRequest) -> Result<ZyContainerResponse> {
        if !self.config.enabled {
            return Err(ZyError::ContainerUnavailable(
                "container backend disabled by configuration".to_string(),
            ));
        }
        if !self.runtime.is_available() {
            return Err(ZyError::ContainerUnavailable(
                "container daemon is not reachable".to_string(),
            ));
        }
        if !self.runtime.image_exists(&request.image)? {
            return Err(ZyError::ContainerImageNotFound {
                image: request.image.clone(),
            });
        }

        let scratch = tempfile::Builder::new().prefix("zyme-container-").tempdir()?;
        let inputs_dir = scratch.path().join("inputs");
        let outputs_dir = scratch.path().join("outputs");
        fs::create_dir_all(&inputs_dir)?;
        fs::create_dir_all(&outputs_dir)?;

        let workdir = self.config.workdir.trim_end_matches('/').to_string();
        let mut mapping = BTreeMap::new();
        for input in &request.inputs {
            let name = input.file_name().ok_or_else(|| {
                ZyError::validation(format!(
                    "container input {} has no file name",
                    input.to_string_lossy()
                ))
            })?;
            fs::copy(input, inputs_dir.join(name))?;
            mapping.insert(
                input.to_string_lossy().into_owned(),
                format!("{}/inputs/{}", workdir, name.to_string_lossy()),
            );
        }

        let body = json!({
            "method": request.method,
            "arguments": rewrite_paths(&request.arguments, &mapping),
        });
        fs::write(
            scratch.path().join(REQUEST_FILE),
            serde_json::to_vec_pretty(&body)?,
        )?;

        let mut env = BTreeMap::new();
        env.insert("ZYME_METHOD".to_string(), request.method.clone());
        env.insert("ZYME_REQUEST".to_string(), format!("{}/{}", workdir, REQUEST_FILE));
        let spec = ZyContainerRunSpec {
            image: request.image.clone(),
            mounts: vec![(scratch.path().to_path_buf(), workdir.clone())],
            workdir,
            env,
            extra_args: self.config.extra_args.clone(),
            command: Vec::new(),
        };

        log::info!(
            "container.run: starting container - image={}, method={}, inputs={}",
            request.image,
            request.method,
            request.inputs.len()
        );
        let id = self.runtime.run(&spec)?;
        let guard = ZyContainerGuard {
            runtime: self.runtime.as_ref(),
            id,
        };

        let timeout = Duration::from_secs(self.config.wait_timeout_secs);
        let exit_code = match self.runtime.wait(&guard.id, timeout)? {
            Some(code) => code,
            None => {
                return Err(ZyError::ContainerTimeout {
                    image: request.image.clone(),
                    timeout_secs: self.config.wait_timeout_secs,
                })
            }
        };

        let logs = match self.runtime.logs(&guard.id) {
            Ok(logs) => logs,
            Err(e) => {
                log::warn!(
                    "container.logs_failed: could not capture logs - id={}, error={}",
                    guard.id,
                    e
                );
                String::new()
            }
        };

        if exit_code != 0 {
            return Err(ZyError::ContainerExit {
                image: request.image.clone(),
                exit_code,
                logs,
            });
        }
        drop(guard);

        let mut copied = Vec::new();
        if let Some(output_dir) = &request.output_dir {
            fs::create_dir_all(output_dir)?;
            for name in &request.outputs {
                let base = Path::new(name).file_name().ok_or_else(|| {
                    ZyError::validation(format!("container output '{}' has no file name", name))
                })?;
                let dest = output_dir.join(base);
                fs::copy(outputs_dir.join(base), &dest)?;
                copied.push(dest);
            }
        }

        let result_path = outputs_dir.join(RESULT_FILE);
        let text = fs::read_to_string(&result_path).map_err(|e| {
            ZyError::execution(
                request.image.clone(),
                format!("container produced no outputs/{}: {}", RESULT_FILE, e),
                vec![],
            )
        })?;
        let result: Value = serde_json::from_str(&text)?;

        log::info!(
            "container.done: container finished - image={}, method={}, outputs={}",
            request.image,
            request.method,
            copied.len()
        );

        Ok(ZyContainerResponse {
            result,
            logs,
            outputs: copied,
        })
    }

    /// `generate` protocol: result `{"candidates": [...]}`.
    pub fn generate(
        &self,
        image: &str,
        request: &ZyDesignRequest,
        inputs: &[PathBuf],
    ) -> Result<Vec<ZyDesignCandidate>> {
        #[derive(Deserialize)]
        struct GenerateResult {
            candidates: Vec<ZyDesignCandidate>,
        }

        let mut container_request =
            ZyContainerRequest::new(image, "generate", serde_json::to_value(request)?);
        container_request.inputs = inputs.to_vec();
        let response = self.execute(&container_request)?;
        let parsed: GenerateResult = serde_json::from_value(response.result)?;
        Ok(parsed.candidates)
    }

    /// `suggest_next` protocol: result `{"parameters": {...}}`.
    pub fn suggest_next(
        &self,
        image: &str,
        setup: &ZyOptimizerSetup,
        history: &[ZyExperimentResult],
    ) -> Result<ZyOptimizationStep> {
        let arguments = json!({ "setup": setup, "history": history });
        let response = self.execute(&ZyContainerRequest::new(image, "suggest_next", arguments))?;
        Ok(serde_json::from_value(response.result)?)
    }

    /// `evaluate` protocol: result `{"objective_value": ..., "metrics": {...}}`.
    pub fn evaluate(
        &self,
        image: &str,
        parameters: &Map<String, Value>,
        run: &Map<String, Value>,
    ) -> Result<ZyEvaluation> {
        let arguments = json!({ "parameters": parameters, "run": run });
        let response = self.execute(&ZyContainerRequest::new(image, "evaluate", arguments))?;
        Ok(serde_json::from_value(response.result)?)
    }
}
