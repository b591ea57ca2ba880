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

//! Plugin metadata, lifecycle state and the instance wrapper held by the
//! registry.
//!
//! A plugin is described by a [`ZyPluginDescriptor`] (identity, capability
//! kind, priority, dependencies, optional container image). The registry pairs
//! it with a lifecycle state and, once constructed, a singleton
//! [`ZyPluginInstance`] inside a [`ZyPluginInfo`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::{ZyGenerator, ZyOptimizer};
use crate::errors::Result;
use crate::orbit::version::{ZyPluginVersion, ZyVersionConstraint};

/// Ordering weight of a plugin. Higher priorities are listed first by
/// `ZyPluginRegistry::names`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZyPluginPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

/// Capability a plugin provides to the execution engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZyCapabilityKind {
    Generator,
    Optimizer,
}

impl fmt::Display for ZyCapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZyCapabilityKind::Generator => f.write_str("generator"),
            ZyCapabilityKind::Optimizer => f.write_str("optimizer"),
        }
    }
}

/// Plugin lifecycle state
///
/// `Unloaded -> Loaded -> Active -> Loaded -> Unloaded`; any state may move to
/// `Error`, which is terminal until the plugin is registered again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ZyPluginState {
    Unloaded,
    Loaded,
    Active,
    Error,
}

impl fmt::Display for ZyPluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZyPluginState::Unloaded => "UNLOADED",
            ZyPluginState::Loaded => "LOADED",
            ZyPluginState::Active => "ACTIVE",
            ZyPluginState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Plugin dependency specification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZyPluginDependency {
    pub name: String,
    #[serde(default, rename = "version")]
    pub constraint: Option<ZyVersionConstraint>,
    #[serde(default)]
    pub optional: bool,
}

impl ZyPluginDependency {
    pub fn required(name: impl Into<String>) -> Self {
        ZyPluginDependency {
            name: name.into(),
            constraint: None,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        ZyPluginDependency {
            name: name.into(),
            constraint: None,
            optional: true,
        }
    }

    pub fn with_constraint(mut self, constraint: &str) -> Result<Self> {
        self.constraint = Some(ZyVersionConstraint::parse(constraint)?);
        Ok(self)
    }

    /// Whether a dependency target with the given version satisfies this
    /// declaration. `None` means the target is not available at all.
    pub fn is_satisfied_by(&self, available: Option<&ZyPluginVersion>) -> bool {
        match (available, &self.constraint) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(version), Some(constraint)) => constraint.matches(version),
        }
    }

    /// Human readable form used in dependency error messages.
    pub fn describe(&self) -> String {
        match &self.constraint {
            Some(c) => format!("{} ({})", self.name, c),
            None => self.name.clone(),
        }
    }
}

/// Static metadata describing a plugin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ZyPluginDescriptor {
    pub name: String,
    #[serde(default)]
    pub version: ZyPluginVersion,
    #[serde(default)]
    pub description: String,
    pub kind: ZyCapabilityKind,
    #[serde(default)]
    pub priority: ZyPluginPriority,
    #[serde(default)]
    pub dependencies: Vec<ZyPluginDependency>,
    #[serde(default)]
    pub container_image: Option<String>,
}

impl ZyPluginDescriptor {
    pub fn new(name: impl Into<String>, kind: ZyCapabilityKind) -> Self {
        ZyPluginDescriptor {
            name: name.into(),
            version: ZyPluginVersion::default(),
            description: String::new(),
            kind,
            priority: ZyPluginPriority::default(),
            dependencies: Vec::new(),
            container_image: None,
        }
    }

    pub fn generator(name: impl Into<String>) -> Self {
        Self::new(name, ZyCapabilityKind::Generator)
    }

    pub fn optimizer(name: impl Into<String>) -> Self {
        Self::new(name, ZyCapabilityKind::Optimizer)
    }

    pub fn with_version(mut self, version: ZyPluginVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: ZyPluginPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, dependency: ZyPluginDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_container_image(mut self, image: impl Into<String>) -> Self {
        self.container_image = Some(image.into());
        self
    }
}

/// Lifecycle callbacks every plugin may observe. Each is invoked exactly once
/// per corresponding transition.
pub trait ZyPluginHooks {
    fn on_load(&self) -> Result<()> {
        Ok(())
    }

    fn on_activate(&self) -> Result<()> {
        Ok(())
    }

    fn on_deactivate(&self) -> Result<()> {
        Ok(())
    }

    fn on_unload(&self) -> Result<()> {
        Ok(())
    }
}

/// Which hook a lifecycle transition runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZyLifecycleHook {
    Load,
    Activate,
    Deactivate,
    Unload,
}

impl ZyLifecycleHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZyLifecycleHook::Load => "on_load",
            ZyLifecycleHook::Activate => "on_activate",
            ZyLifecycleHook::Deactivate => "on_deactivate",
            ZyLifecycleHook::Unload => "on_unload",
        }
    }
}

/// Singleton capability instance owned by the registry.
#[derive(Clone, Debug)]
pub enum ZyPluginInstance {
    Generator(Arc<dyn ZyGenerator>),
    Optimizer(Arc<dyn ZyOptimizer>),
}

impl ZyPluginInstance {
    pub fn kind(&self) -> ZyCapabilityKind {
        match self {
            ZyPluginInstance::Generator(_) => ZyCapabilityKind::Generator,
            ZyPluginInstance::Optimizer(_) => ZyCapabilityKind::Optimizer,
        }
    }

    pub fn as_generator(&self) -> Option<Arc<dyn ZyGenerator>> {
        match self {
            ZyPluginInstance::Generator(g) => Some(Arc::clone(g)),
            ZyPluginInstance::Optimizer(_) => None,
        }
    }

    pub fn as_optimizer(&self) -> Option<Arc<dyn ZyOptimizer>> {
        match self {
            ZyPluginInstance::Optimizer(o) => Some(Arc::clone(o)),
            ZyPluginInstance::Generator(_) => None,
        }
    }

    pub(crate) fn run_hook(&self, hook: ZyLifecycleHook) -> Result<()> {
        match self {
            ZyPluginInstance::Generator(g) => match hook {
                ZyLifecycleHook::Load => g.on_load(),
                ZyLifecycleHook::Activate => g.on_activate(),
                ZyLifecycleHook::Deactivate => g.on_deactivate(),
                ZyLifecycleHook::Unload => g.on_unload(),
            },
            ZyPluginInstance::Optimizer(o) => match hook {
                ZyLifecycleHook::Load => o.on_load(),
                ZyLifecycleHook::Activate => o.on_activate(),
                ZyLifecycleHook::Deactivate => o.on_deactivate(),
                ZyLifecycleHook::Unload => o.on_unload(),
            },
        }
    }
}

/// Factory constructing a plugin singleton on first use.
pub type ZyPluginFactory = fn() -> Result<ZyPluginInstance>;

/// Registry entry: descriptor, state and (once constructed) the instance.
#[derive(Clone, Debug)]
pub struct ZyPluginInfo {
    pub descriptor: ZyPluginDescriptor,
    pub state: ZyPluginState,
    pub last_error: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub(crate) sequence: usize,
    /// Set by an explicit unload; a parked plugin is not constructed on behalf
    /// of a dependent until it is requested directly again.
    pub(crate) parked: bool,
    pub(crate) factory: Option<ZyPluginFactory>,
    pub(crate) instance: Option<ZyPluginInstance>,
}

impl ZyPluginInfo {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn is_constructed(&self) -> bool {
        self.instance.is_some()
    }

    /// Whether `get` could produce an instance without external help.
    pub fn is_loadable(&self) -> bool {
        self.state != ZyPluginState::Error
            && (self.instance.is_some() || (self.factory.is_some() && !self.parked))
    }
}
