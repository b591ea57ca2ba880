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

//! # Engine Configuration
//!
//! [`ZyEngineConfig`] groups the settings of the execution engine into three
//! sections (staging, container, optimize). Partial configurations are read
//! into [`ZyEngineConfigBuilder`], whose `Option` fields are merged onto the
//! defaults, so a file only needs to mention what it overrides.
//!
//! ```rust
//! use zyme::config::ZyEngineConfigBuilder;
//!
//! let config = ZyEngineConfigBuilder::from_yaml_str("container:\n  enabled: false\n").unwrap();
//! assert!(!config.container.enabled);
//! assert_eq!(config.container.binary, "docker");
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, ZyError};

/// Data staging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyStagingConfig {
    /// Parent directory for run temp directories; the system temp dir when unset.
    pub root_dir: Option<PathBuf>,
    pub dir_prefix: String,
    pub download_timeout_secs: u64,
}

impl Default for ZyStagingConfig {
    fn default() -> Self {
        ZyStagingConfig {
            root_dir: None,
            dir_prefix: "zyme-run-".to_string(),
            download_timeout_secs: 300,
        }
    }
}

/// Container backend settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyContainerConfig {
    pub enabled: bool,
    /// Container CLI binary.
    pub binary: String,
    /// Mount point of the scratch directory inside the container.
    pub workdir: String,
    pub wait_timeout_secs: u64,
    /// Extra arguments passed to `run` before the image name.
    pub extra_args: Vec<String>,
}

impl Default for ZyContainerConfig {
    fn default() -> Self {
        ZyContainerConfig {
            enabled: true,
            binary: "docker".to_string(),
            workdir: "/workspace".to_string(),
            wait_timeout_secs: 3600,
            extra_args: Vec::new(),
        }
    }
}

/// Defaults applied to optimize blocks that omit them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZyOptimizeConfig {
    pub default_max_experiments: usize,
    pub default_convergence_threshold: Option<f64>,
}

impl Default for ZyOptimizeConfig {
    fn default() -> Self {
        ZyOptimizeConfig {
            default_max_experiments: 10,
            default_convergence_threshold: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZyEngineConfig {
    pub staging: ZyStagingConfig,
    pub container: ZyContainerConfig,
    pub optimize: ZyOptimizeConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZyStagingConfigBuilder {
    pub root_dir: Option<PathBuf>,
    pub dir_prefix: Option<String>,
    pub download_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZyContainerConfigBuilder {
    pub enabled: Option<bool>,
    pub binary: Option<String>,
    pub workdir: Option<String>,
    pub wait_timeout_secs: Option<u64>,
    pub extra_args: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZyOptimizeConfigBuilder {
    pub default_max_experiments: Option<usize>,
    pub default_convergence_threshold: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ZyEngineConfigBuilder {
    #[serde(default)]
    pub staging: ZyStagingConfigBuilder,
    #[serde(default)]
    pub container: ZyContainerConfigBuilder,
    #[serde(default)]
    pub optimize: ZyOptimizeConfigBuilder,
}

impl ZyEngineConfigBuilder {
    pub fn build(self) -> ZyEngineConfig {
        let base = ZyEngineConfig::default();
        ZyEngineConfig {
            staging: ZyStagingConfig {
                root_dir: self.staging.root_dir.or(base.staging.root_dir),
                dir_prefix: self.staging.dir_prefix.unwrap_or(base.staging.dir_prefix),
                download_timeout_secs: self
                    .staging
                    .download_timeout_secs
                    .unwrap_or(base.staging.download_timeout_secs),
            },
            container: ZyContainerConfig {
                enabled: self.container.enabled.unwrap_or(base.container.enabled),
                binary: self.container.binary.unwrap_or(base.container.binary),
                workdir: self.container.workdir.unwrap_or(base.container.workdir),
                wait_timeout_secs: self
                    .container
                    .wait_timeout_secs
                    .unwrap_or(base.container.wait_timeout_secs),
                extra_args: self.container.extra_args.unwrap_or(base.container.extra_args),
            },
            optimize: ZyOptimizeConfig {
                default_max_experiments: self
                    .optimize
                    .default_max_experiments
                    .unwrap_or(base.optimize.default_max_experiments),
                default_convergence_threshold: self
                    .optimize
                    .default_convergence_threshold
                    .or(base.optimize.default_convergence_threshold),
            },
        }
    }

    pub fn from_json(value: &Value) -> Result<ZyEngineConfig> {
        let builder: ZyEngineConfigBuilder = serde_json::from_value(value.clone())?;
        Ok(builder.build())
    }

    pub fn from_json_str(source: &str) -> Result<ZyEngineConfig> {
        let builder: ZyEngineConfigBuilder = serde_json::from_str(source)?;
        Ok(builder.build())
    }

    pub fn from_yaml_str(source: &str) -> Result<ZyEngineConfig> {
        let builder: ZyEngineConfigBuilder = serde_yaml::from_str(source)?;
        Ok(builder.build())
    }

    /// Load from a file, picking the format by extension.
    pub fn from_path(path: &Path) -> Result<ZyEngineConfig> {
        let content = std::fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "json" => Self::from_json_str(&content),
            "yaml" | "yml" => Self::from_yaml_str(&content),
            other => Err(ZyError::validation(format!(
                "unsupported config format '{}' for {}",
                other,
                path.to_string_lossy()
            ))),
        }
    }
}
