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

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Result, ZyError};
use crate::orbit::plugin::{
    ZyCapabilityKind, ZyPluginDependency, ZyPluginDescriptor, ZyPluginPriority,
};
use crate::orbit::version::{ZyPluginVersion, ZyVersionConstraint};

/// Manifest file names probed in a plugin directory, in order.
pub const MANIFEST_FILE_NAMES: [&str; 3] = ["zyme_plugin.json", "zyme_plugin.yaml", "zyme_plugin.yml"];

#[derive(Debug, Deserialize)]
struct ZyPluginDependencyFile {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    optional: bool,
}

impl ZyPluginDependencyFile {
    fn into_runtime(self) -> Result<ZyPluginDependency> {
        let constraint = match self.version {
            Some(v) => Some(ZyVersionConstraint::parse(&v)?),
            None => None,
        };
        Ok(ZyPluginDependency {
            name: self.name,
            constraint,
            optional: self.optional,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ZyPluginManifestFile {
    name: String,
    #[serde(default = "default_version")]
    version: String,
    kind: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    description: String,
    entry_point: String,
    #[serde(default)]
    container_image: Option<String>,
    #[serde(default)]
    dependencies: Vec<ZyPluginDependencyFile>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// A parsed manifest: the descriptor plus the static entry point that
/// constructs the plugin.
#[derive(Clone, Debug)]
pub struct ZyPluginManifest {
    pub descriptor: ZyPluginDescriptor,
    pub entry_point: String,
    pub path: PathBuf,
}

impl ZyPluginManifestFile {
    fn into_runtime(self, path: &Path) -> Result<ZyPluginManifest> {
        let kind = match self.kind.to_ascii_lowercase().as_str() {
            "generator" => ZyCapabilityKind::Generator,
            "optimizer" => ZyCapabilityKind::Optimizer,
            other => {
                return Err(ZyError::validation(format!(
                    "unknown plugin kind: {}",
                    other
                )));
            }
        };

        let priority = match self.priority.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("normal") => ZyPluginPriority::Normal,
            Some("lowest") => ZyPluginPriority::Lowest,
            Some("low") => ZyPluginPriority::Low,
            Some("high") => ZyPluginPriority::High,
            Some("highest") => ZyPluginPriority::Highest,
            Some(other) => {
                return Err(ZyError::validation(format!(
                    "unknown plugin priority: {}",
                    other
                )));
            }
        };

        if self.entry_point.trim().is_empty() {
            return Err(ZyError::validation(format!(
                "plugin '{}' manifest has an empty entry_point",
                self.name
            )));
        }

        let dependencies = self
            .dependencies
            .into_iter()
            .map(|d| d.into_runtime())
            .collect::<Result<Vec<_>>>()?;

        let mut descriptor = ZyPluginDescriptor::new(self.name, kind)
            .with_version(ZyPluginVersion::parse(&self.version)?)
            .with_description(self.description)
            .with_priority(priority);
        descriptor.dependencies = dependencies;
        descriptor.container_image = self.container_image;

        Ok(ZyPluginManifest {
            descriptor,
            entry_point: self.entry_point,
            path: path.to_path_buf(),
        })
    }
}

/// Locate the manifest inside a plugin directory, or accept a manifest path.
pub fn manifest_path(path: &Path) -> Option<PathBuf> {
    if path.is_dir() {
        MANIFEST_FILE_NAMES
            .iter()
            .map(|name| path.join(name))
            .find(|candidate| candidate.is_file())
    } else if path.is_file() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

/// Load a plugin manifest from a directory or a manifest file. The format is
/// chosen by extension (`.yaml`/`.yml`, anything else is JSON).
pub fn load_manifest(path: &Path) -> Result<ZyPluginManifest> {
    let meta_path = manifest_path(path).ok_or_else(|| {
        ZyError::validation(format!(
            "no plugin manifest found at {}",
            path.to_string_lossy()
        ))
    })?;

    let text = fs::read_to_string(&meta_path)?;
    let is_yaml = meta_path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let file: ZyPluginManifestFile = if is_yaml {
        serde_yaml::from_str(&text)?
    } else {
        serde_json::from_str(&text)?
    };
    file.into_runtime(&meta_path)
}
