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

//! Plugin discovery.
//!
//! Plugins are found from a static table compiled into the host (name to
//! factory) and from manifest directories whose `entry_point` names one of the
//! table's factories. Every candidate ends up in a [`ZyDiscoveryReport`]; a
//! failing candidate never stops discovery of the others.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::orbit::manifest::{load_manifest, manifest_path};
use crate::orbit::plugin::{ZyPluginDescriptor, ZyPluginFactory};
use crate::orbit::registry::ZyPluginRegistry;
use crate::plugins;

/// Static discovery surface: registered entries, the entry points manifests
/// may reference, an optional name to image table and manifest search paths.
#[derive(Clone, Debug, Default)]
pub struct ZyDiscoveryTable {
    pub entries: Vec<(ZyPluginDescriptor, String)>,
    pub entry_points: BTreeMap<String, ZyPluginFactory>,
    pub images: BTreeMap<String, String>,
    pub search_paths: Vec<PathBuf>,
}

impl ZyDiscoveryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table carrying the built-in plugins, each registered under its own
    /// entry point.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (descriptor, entry_point, factory) in plugins::builtin_entries() {
            table = table
                .with_entry_point(entry_point, factory)
                .with_entry(descriptor, entry_point);
        }
        table
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>, factory: ZyPluginFactory) -> Self {
        self.entry_points.insert(entry_point.into(), factory);
        self
    }

    pub fn with_entry(mut self, descriptor: ZyPluginDescriptor, entry_point: impl Into<String>) -> Self {
        self.entries.push((descriptor, entry_point.into()));
        self
    }

    pub fn with_image(mut self, name: impl Into<String>, image: impl Into<String>) -> Self {
        self.images.insert(name.into(), image.into());
        self
    }

    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ZyDiscoveryOutcome {
    Registered,
    Skipped(String),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZyDiscoveryCandidate {
    /// `table:<entry_point>` or the manifest path.
    pub source: String,
    pub name: Option<String>,
    pub outcome: ZyDiscoveryOutcome,
}

/// Per-candidate outcome of [`ZyPluginRegistry::discover`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZyDiscoveryReport {
    pub candidates: Vec<ZyDiscoveryCandidate>,
}

impl ZyDiscoveryReport {
    pub fn registered(&self) -> Vec<&str> {
        self.candidates
            .iter()
            .filter(|c| c.outcome == ZyDiscoveryOutcome::Registered)
            .filter_map(|c| c.name.as_deref())
            .collect()
    }

    pub fn failed(&self) -> Vec<&ZyDiscoveryCandidate> {
        self.candidates
            .iter()
            .filter(|c| matches!(c.outcome, ZyDiscoveryOutcome::Failed(_)))
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failed().is_empty()
    }

    fn push(&mut self, source: String, name: Option<String>, outcome: ZyDiscoveryOutcome) {
        match &outcome {
            ZyDiscoveryOutcome::Registered => log::info!(
                "orbit.discovery.registered: plugin discovered - source={}, plugin={}",
                source,
                name.as_deref().unwrap_or("-")
            ),
            ZyDiscoveryOutcome::Skipped(reason) => log::debug!(
                "orbit.discovery.skipped: discovery candidate skipped - source={}, plugin={}, reason={}",
                source,
                name.as_deref().unwrap_or("-"),
                reason
            ),
            ZyDiscoveryOutcome::Failed(error) => log::warn!(
                "orbit.discovery.failed: discovery candidate failed - source={}, plugin={}, error={}",
                source,
                name.as_deref().unwrap_or("-"),
                error
            ),
        }
        self.candidates.push(ZyDiscoveryCandidate {
            source,
            name,
            outcome,
        });
    }
}

fn plugin_dirs(search_path: &Path) -> std::io::Result<Vec<PathBuf>> {
    if search_path.is_dir() && manifest_path(search_path).is_some() {
        return Ok(vec![search_path.to_path_buf()]);
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(search_path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

impl ZyPluginRegistry {
    /// Register the table's entries, apply its image mapping, then scan its
    /// search paths for plugin manifests.
    pub fn discover(&mut self, table: &ZyDiscoveryTable) -> ZyDiscoveryReport {
        let mut report = ZyDiscoveryReport::default();

        for (descriptor, entry_point) in &table.entries {
            let source = format!("table:{}", entry_point);
            let name = Some(descriptor.name.clone());
            let outcome = match table.entry_points.get(entry_point) {
                Some(factory) => match self.register_factory(descriptor.clone(), *factory) {
                    Ok(()) => ZyDiscoveryOutcome::Registered,
                    Err(e) => ZyDiscoveryOutcome::Failed(e.to_string()),
                },
                None => ZyDiscoveryOutcome::Failed(format!("unknown entry point '{}'", entry_point)),
            };
            report.push(source, name, outcome);
        }

        for (name, image) in &table.images {
            self.set_container_image(name.clone(), image.clone());
        }

        for search_path in &table.search_paths {
            if !search_path.exists() {
                report.push(
                    search_path.to_string_lossy().into_owned(),
                    None,
                    ZyDiscoveryOutcome::Skipped("search path does not exist".to_string()),
                );
                continue;
            }

            let dirs = match plugin_dirs(search_path) {
                Ok(dirs) => dirs,
                Err(e) => {
                    report.push(
                        search_path.to_string_lossy().into_owned(),
                        None,
                        ZyDiscoveryOutcome::Failed(e.to_string()),
                    );
                    continue;
                }
            };

            for dir in dirs {
                let source = dir.to_string_lossy().into_owned();
                if manifest_path(&dir).is_none() {
                    report.push(
                        source,
                        None,
                        ZyDiscoveryOutcome::Skipped("no manifest".to_string()),
                    );
                    continue;
                }

                let manifest = match load_manifest(&dir) {
                    Ok(m) => m,
                    Err(e) => {
                        report.push(source, None, ZyDiscoveryOutcome::Failed(e.to_string()));
                        continue;
                    }
                };

                let name = manifest.descriptor.name.clone();
                if self.contains(&name) {
                    report.push(
                        source,
                        Some(name),
                        ZyDiscoveryOutcome::Skipped("plugin already registered".to_string()),
                    );
                    continue;
                }

                let outcome = match table.entry_points.get(&manifest.entry_point) {
                    Some(factory) => match self.register_factory(manifest.descriptor, *factory) {
                        Ok(()) => ZyDiscoveryOutcome::Registered,
                        Err(e) => ZyDiscoveryOutcome::Failed(e.to_string()),
                    },
                    None => ZyDiscoveryOutcome::Failed(format!(
                        "unknown entry point '{}'",
                        manifest.entry_point
                    )),
                };
                report.push(source, Some(name), outcome);
            }
        }

        log::info!(
            "orbit.discovery.complete: discovery finished - candidates={}, registered={}, failed={}",
            report.candidates.len(),
            report.registered().len(),
            report.failed().len()
        );
        report
    }
}
