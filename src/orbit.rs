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

pub mod discovery;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod version;

pub use discovery::{
    ZyDiscoveryCandidate, ZyDiscoveryOutcome, ZyDiscoveryReport, ZyDiscoveryTable,
};
pub use manifest::{load_manifest, ZyPluginManifest};
pub use plugin::{
    ZyCapabilityKind, ZyPluginDependency, ZyPluginDescriptor, ZyPluginFactory, ZyPluginHooks,
    ZyPluginInfo, ZyPluginInstance, ZyPluginPriority, ZyPluginState,
};
pub use registry::{ZyLifecycleObserver, ZyPluginRegistry};
pub use version::{ZyPluginVersion, ZyVersionConstraint};
