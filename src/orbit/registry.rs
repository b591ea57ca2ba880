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

//! # Plugin Registry
//!
//! The registry is the single source of truth for plugin metadata and
//! singleton instances. It provides:
//!
//! - Registration of ready instances or lazy factories
//! - Dependency validation with an error that names every unmet dependency
//! - Lifecycle transitions with hook dispatch and observer notification
//! - A deterministic, dependency-respecting and priority-ordered listing
//!
//! A failure local to one plugin (missing dependency, failing hook) moves that
//! plugin to `ERROR` and never corrupts the rest of the registry.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;

use crate::capability::{ZyGenerator, ZyOptimizer};
use crate::dag::{ZyDependencyGraph, ZyGraphNode};
use crate::errors::{panic_message, Result, ZyError};
use crate::orbit::plugin::{
    ZyCapabilityKind, ZyLifecycleHook, ZyPluginDependency, ZyPluginDescriptor, ZyPluginFactory,
    ZyPluginInfo, ZyPluginInstance, ZyPluginState,
};

/// Process-wide observer notified with `(plugin, new_state)` on every
/// lifecycle transition.
pub type ZyLifecycleObserver = Box<dyn Fn(&str, ZyPluginState) -> Result<()> + Send + Sync>;

/// Catalog of plugins keyed by name.
#[derive(Default)]
pub struct ZyPluginRegistry {
    plugins: HashMap<String, ZyPluginInfo>,
    images: HashMap<String, String>,
    observers: Vec<ZyLifecycleObserver>,
    next_sequence: usize,
}

impl fmt::Debug for ZyPluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZyPluginRegistry")
            .field("plugins", &self.names())
            .field("images", &self.images)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ZyPluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already constructed singleton. The plugin enters `LOADED`
    /// after its `on_load` hook succeeds.
    pub fn register(
        &mut self,
        descriptor: ZyPluginDescriptor,
        instance: ZyPluginInstance,
    ) -> Result<()> {
        if instance.kind() != descriptor.kind {
            return Err(ZyError::validation(format!(
                "plugin '{}' is declared as {} but the instance is a {}",
                descriptor.name,
                descriptor.kind,
                instance.kind()
            )));
        }

        let name = descriptor.name.clone();
        self.insert(descriptor, None);

        match Self::invoke_hook(&name, &instance, ZyLifecycleHook::Load) {
            Ok(()) => {
                if let Some(info) = self.plugins.get_mut(&name) {
                    info.instance = Some(instance);
                }
                self.transition(&name, ZyPluginState::Loaded);
                Ok(())
            }
            Err(e) => {
                self.fail(&name, &e);
                Err(e)
            }
        }
    }

    /// Register a factory; the singleton is constructed on the first `get`.
    pub fn register_factory(
        &mut self,
        descriptor: ZyPluginDescriptor,
        factory: ZyPluginFactory,
    ) -> Result<()> {
        let name = descriptor.name.clone();
        self.insert(descriptor, Some(factory));
        self.transition(&name, ZyPluginState::Unloaded);
        Ok(())
    }

    fn insert(
        &mut self,
        descriptor: ZyPluginDescriptor,
        factory: Option<ZyPluginFactory>,
    ) {
        let name = descriptor.name.clone();
        let sequence = match self.plugins.get(&name) {
            Some(existing) => {
                log::info!(
                    "orbit.plugin.replace: replacing registered plugin - plugin={}, previous_version={}, previous_state={}, new_version={}",
                    name,
                    existing.descriptor.version,
                    existing.state,
                    descriptor.version
                );
                existing.sequence
            }
            None => {
                let seq = self.next_sequence;
                self.next_sequence += 1;
                seq
            }
        };

        log::info!(
            "orbit.plugin.register: plugin registered - plugin={}, version={}, kind={}, priority={:?}, dependencies={}, lazy={}",
            name,
            descriptor.version,
            descriptor.kind,
            descriptor.priority,
            descriptor.dependencies.len(),
            factory.is_some()
        );

        self.plugins.insert(
            name,
            ZyPluginInfo {
                descriptor,
                state: ZyPluginState::Unloaded,
                last_error: None,
                registered_at: Utc::now(),
                sequence,
                parked: false,
                factory,
                instance: None,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn info(&self, name: &str) -> Option<&ZyPluginInfo> {
        self.plugins.get(name)
    }

    pub fn state(&self, name: &str) -> Option<ZyPluginState> {
        self.plugins.get(name).map(|info| info.state)
    }

    pub fn last_error(&self, name: &str) -> Option<&str> {
        self.plugins.get(name).and_then(|info| info.last_error.as_deref())
    }

    /// Map a plugin name to a container image. The name need not be
    /// registered locally.
    pub fn set_container_image(&mut self, name: impl Into<String>, image: impl Into<String>) {
        let name = name.into();
        let image = image.into();
        log::debug!(
            "orbit.plugin.image: container image mapped - plugin={}, image={}",
            name,
            image
        );
        self.images.insert(name, image);
    }

    /// Explicit mapping first, then the image declared by the descriptor.
    pub fn container_image(&self, name: &str) -> Option<String> {
        self.images.get(name).cloned().or_else(|| {
            self.plugins
                .get(name)
                .and_then(|info| info.descriptor.container_image.clone())
        })
    }

    /// Names with an explicit image mapping but no local registration.
    pub fn container_only_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .images
            .keys()
            .filter(|n| !self.plugins.contains_key(*n))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Register an observer called on every lifecycle transition, in
    /// registration order.
    pub fn add_lifecycle_hook<F>(&mut self, observer: F)
    where
        F: Fn(&str, ZyPluginState) -> Result<()> + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Plugin names ordered so that a plugin never precedes a registered
    /// required dependency; among ready plugins higher priority comes first and
    /// registration order breaks ties.
    pub fn names(&self) -> Vec<String> {
        let mut graph = ZyDependencyGraph::new();
        for info in self.plugins.values() {
            let mut node =
                ZyGraphNode::new(info.name(), info.descriptor.priority, info.sequence);
            for dep in info.descriptor.dependencies.iter().filter(|d| !d.optional) {
                node.add_dependency(dep.name.as_str());
            }
            if let Err(e) = graph.add_node(node) {
                log::warn!("orbit.plugin.order: skipping plugin - error={}", e);
            }
        }

        let ordering = graph.ordered();
        if !ordering.cyclic.is_empty() {
            log::warn!(
                "orbit.plugin.cycle: dependency cycle detected; appending by priority - plugins={:?}",
                ordering.cyclic.iter().map(|n| n.0.as_str()).collect::<Vec<_>>()
            );
        }
        ordering.order.into_iter().map(|n| n.0).collect()
    }

    pub fn names_by_kind(&self, kind: ZyCapabilityKind) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|n| {
                self.plugins
                    .get(n)
                    .map_or(false, |info| info.descriptor.kind == kind)
            })
            .collect()
    }

    fn dependency_available(&self, dep: &ZyPluginDependency) -> bool {
        let Some(target) = self.plugins.get(&dep.name) else {
            return false;
        };
        let usable = match target.state {
            ZyPluginState::Error => false,
            ZyPluginState::Loaded | ZyPluginState::Active => target.instance.is_some(),
            ZyPluginState::Unloaded => target.factory.is_some() && !target.parked,
        };
        usable && dep.is_satisfied_by(Some(&target.descriptor.version))
    }

    fn unmet_dependencies(&self, info: &ZyPluginInfo) -> Vec<String> {
        info.descriptor
            .dependencies
            .iter()
            .filter(|dep| !dep.optional && !self.dependency_available(dep))
            .map(ZyPluginDependency::describe)
            .collect()
    }

    /// Read-only pre-flight check: unmet required dependencies per plugin.
    /// Plugins whose dependencies are all met are omitted.
    pub fn validate_plugin_dependencies(&self) -> BTreeMap<String, Vec<String>> {
        self.plugins
            .values()
            .filter_map(|info| {
                let unmet = self.unmet_dependencies(info);
                (!unmet.is_empty()).then(|| (info.name().to_string(), unmet))
            })
            .collect()
    }

    /// Return the singleton for `name`, constructing it (and any required
    /// dependency that is not yet constructed) on first use.
    pub fn get(&mut self, name: &str) -> Result<ZyPluginInstance> {
        if let Some(info) = self.plugins.get_mut(name) {
            info.parked = false;
        }
        let mut stack = Vec::new();
        self.load_inner(name, &mut stack)
    }

    /// Alias of [`get`](Self::get).
    pub fn load(&mut self, name: &str) -> Result<ZyPluginInstance> {
        self.get(name)
    }

    pub fn generator(&mut self, name: &str) -> Result<Arc<dyn ZyGenerator>> {
        let instance = self.get(name)?;
        instance.as_generator().ok_or_else(|| {
            ZyError::validation(format!(
                "plugin '{}' is a {}, not a generator",
                name,
                instance.kind()
            ))
        })
    }

    pub fn optimizer(&mut self, name: &str) -> Result<Arc<dyn ZyOptimizer>> {
        let instance = self.get(name)?;
        instance.as_optimizer().ok_or_else(|| {
            ZyError::validation(format!(
                "plugin '{}' is a {}, not an optimizer",
                name,
                instance.kind()
            ))
        })
    }

    fn load_inner(&mut self, name: &str, stack: &mut Vec<String>) -> Result<ZyPluginInstance> {
        let info = self.plugins.get(name).ok_or_else(|| ZyError::PluginNotFound {
            name: name.to_string(),
            available: self.names(),
        })?;

        if info.state == ZyPluginState::Error {
            return Err(ZyError::plugin_load(
                name,
                info.last_error
                    .clone()
                    .unwrap_or_else(|| "plugin is in ERROR state".to_string()),
            ));
        }

        if stack.iter().any(|n| n == name) {
            return Err(ZyError::plugin_load(
                name,
                format!("dependency cycle: {} -> {}", stack.join(" -> "), name),
            ));
        }

        let unmet = self.unmet_dependencies(info);
        if !unmet.is_empty() {
            let err = ZyError::DependencyMissing {
                plugin: name.to_string(),
                missing: unmet,
            };
            self.fail(name, &err);
            return Err(err);
        }

        let pending: Vec<String> = info
            .descriptor
            .dependencies
            .iter()
            .filter(|dep| !dep.optional)
            .filter(|dep| {
                self.plugins
                    .get(&dep.name)
                    .map_or(false, |target| target.instance.is_none())
            })
            .map(|dep| dep.name.clone())
            .collect();

        stack.push(name.to_string());
        for dep in pending {
            if let Err(e) = self.load_inner(&dep, stack) {
                stack.pop();
                let err = ZyError::DependencyMissing {
                    plugin: name.to_string(),
                    missing: vec![format!("{} ({})", dep, e)],
                };
                self.fail(name, &err);
                return Err(err);
            }
        }
        stack.pop();

        let info = self.plugins.get(name).ok_or_else(|| {
            ZyError::internal(format!("plugin '{}' disappeared during load", name))
        })?;
        if let Some(instance) = &info.instance {
            return Ok(instance.clone());
        }

        let factory = match info.factory {
            Some(f) => f,
            None => {
                return Err(ZyError::plugin_load(
                    name,
                    "plugin was unloaded and has no factory; register it again",
                ))
            }
        };
        let kind = info.descriptor.kind;

        let constructed = match catch_unwind(factory) {
            Ok(result) => result,
            Err(payload) => Err(ZyError::plugin_load(
                name,
                format!("factory panicked: {}", panic_message(payload.as_ref())),
            )),
        };

        let instance = match constructed {
            Ok(instance) if instance.kind() == kind => instance,
            Ok(instance) => {
                let err = ZyError::plugin_load(
                    name,
                    format!("factory produced a {} for a {} plugin", instance.kind(), kind),
                );
                self.fail(name, &err);
                return Err(err);
            }
            Err(e) => {
                let err = match e {
                    ZyError::PluginLoad { .. } => e,
                    other => ZyError::plugin_load(name, other.to_string()),
                };
                self.fail(name, &err);
                return Err(err);
            }
        };

        if let Err(e) = Self::invoke_hook(name, &instance, ZyLifecycleHook::Load) {
            self.fail(name, &e);
            return Err(e);
        }

        if let Some(info) = self.plugins.get_mut(name) {
            info.instance = Some(instance.clone());
        }
        self.transition(name, ZyPluginState::Loaded);
        Ok(instance)
    }

    /// `LOADED -> ACTIVE`. Activating an active plugin is a no-op.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        let (state, instance) = self.lifecycle_target(name)?;
        match state {
            ZyPluginState::Active => Ok(()),
            ZyPluginState::Loaded => {
                self.run_transition(name, instance, ZyLifecycleHook::Activate, ZyPluginState::Active)
            }
            other => Err(Self::invalid(name, other, "activate")),
        }
    }

    /// `ACTIVE -> LOADED`.
    pub fn deactivate(&mut self, name: &str) -> Result<()> {
        let (state, instance) = self.lifecycle_target(name)?;
        match state {
            ZyPluginState::Active => self.run_transition(
                name,
                instance,
                ZyLifecycleHook::Deactivate,
                ZyPluginState::Loaded,
            ),
            other => Err(Self::invalid(name, other, "deactivate")),
        }
    }

    /// `LOADED -> UNLOADED` (an active plugin is deactivated first). Refused
    /// while a constructed plugin requires this one.
    pub fn unload(&mut self, name: &str) -> Result<()> {
        let (state, _) = self.lifecycle_target(name)?;
        if matches!(state, ZyPluginState::Unloaded | ZyPluginState::Error) {
            return Err(Self::invalid(name, state, "unload"));
        }

        let dependents = self.constructed_dependents(name);
        if let Some(dependent) = dependents.first() {
            return Err(ZyError::validation(format!(
                "cannot unload plugin '{}' because it is required by plugin '{}'",
                name, dependent
            )));
        }

        if state == ZyPluginState::Active {
            self.deactivate(name)?;
        }

        let (_, instance) = self.lifecycle_target(name)?;
        let hook_result = match &instance {
            Some(instance) => Self::invoke_hook(name, instance, ZyLifecycleHook::Unload),
            None => Ok(()),
        };

        if let Some(info) = self.plugins.get_mut(name) {
            info.instance = None;
            info.parked = true;
        }

        match hook_result {
            Ok(()) => {
                log::info!("orbit.plugin.unloaded: plugin unloaded - plugin={}", name);
                self.transition(name, ZyPluginState::Unloaded);
                Ok(())
            }
            Err(e) => {
                self.fail(name, &e);
                Err(e)
            }
        }
    }

    fn constructed_dependents(&self, name: &str) -> Vec<String> {
        let mut dependents: Vec<&ZyPluginInfo> = self
            .plugins
            .values()
            .filter(|info| info.name() != name && info.instance.is_some())
            .filter(|info| {
                info.descriptor
                    .dependencies
                    .iter()
                    .any(|dep| dep.name == name && !dep.optional)
            })
            .collect();
        dependents.sort_by_key(|info| info.sequence);
        dependents.into_iter().map(|i| i.name().to_string()).collect()
    }

    fn lifecycle_target(&self, name: &str) -> Result<(ZyPluginState, Option<ZyPluginInstance>)> {
        self.plugins
            .get(name)
            .map(|info| (info.state, info.instance.clone()))
            .ok_or_else(|| ZyError::PluginNotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    fn invalid(name: &str, state: ZyPluginState, action: &str) -> ZyError {
        ZyError::InvalidTransition {
            plugin: name.to_string(),
            state: state.to_string(),
            action: action.to_string(),
        }
    }

    fn run_transition(
        &mut self,
        name: &str,
        instance: Option<ZyPluginInstance>,
        hook: ZyLifecycleHook,
        target: ZyPluginState,
    ) -> Result<()> {
        let instance = instance.ok_or_else(|| {
            ZyError::internal(format!("plugin '{}' has no instance", name))
        })?;
        match Self::invoke_hook(name, &instance, hook) {
            Ok(()) => {
                self.transition(name, target);
                Ok(())
            }
            Err(e) => {
                self.fail(name, &e);
                Err(e)
            }
        }
    }

    fn invoke_hook(name: &str, instance: &ZyPluginInstance, hook: ZyLifecycleHook) -> Result<()> {
        let outcome = catch_unwind(AssertUnwindSafe(|| instance.run_hook(hook)));
        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ZyError::plugin_load(
                name,
                format!("{} failed: {}", hook.as_str(), e),
            )),
            Err(payload) => Err(ZyError::plugin_load(
                name,
                format!("{} panicked: {}", hook.as_str(), panic_message(payload.as_ref())),
            )),
        };
        if let Err(e) = &result {
            log::warn!(
                "orbit.plugin.hook_failed: lifecycle hook failed - plugin={}, hook={}, error={}",
                name,
                hook.as_str(),
                e
            );
        }
        result
    }

    fn fail(&mut self, name: &str, error: &ZyError) {
        if let Some(info) = self.plugins.get_mut(name) {
            info.last_error = Some(error.to_string());
            info.instance = None;
        }
        log::error!(
            "orbit.plugin.error: plugin moved to ERROR - plugin={}, error={}",
            name,
            error
        );
        self.transition(name, ZyPluginState::Error);
    }

    fn transition(&mut self, name: &str, state: ZyPluginState) {
        let previous = match self.plugins.get_mut(name) {
            Some(info) => std::mem::replace(&mut info.state, state),
            None => return,
        };
        log::info!(
            "orbit.plugin.transition: lifecycle transition - plugin={}, from={}, to={}",
            name,
            previous,
            state
        );

        for (idx, observer) in self.observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer(name, state))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!(
                    "orbit.plugin.observer_failed: lifecycle observer failed - plugin={}, state={}, observer={}, error={}",
                    name,
                    state,
                    idx,
                    e
                ),
                Err(payload) => log::warn!(
                    "orbit.plugin.observer_panicked: lifecycle observer panicked - plugin={}, state={}, observer={}, panic={}",
                    name,
                    state,
                    idx,
                    panic_message(payload.as_ref())
                ),
            }
        }
    }
}
