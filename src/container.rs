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

//! # Container Execution
//!
//! Plugins may ship as container images. The executor runs one plugin method
//! per container over a scratch directory mounted at the configured work dir:
//!
//! ```text
//! <workdir>/request.json        {"method": ..., "arguments": ...}
//! <workdir>/inputs/...          declared input files
//! <workdir>/outputs/result.json method result written by the plugin
//! ```
//!
//! The container is removed on every exit path. Daemon-unavailable and
//! image-not-found errors let the engine fall back to in-process execution.

pub mod executor;
pub mod runtime;

pub use executor::{ZyContainerExecutor, ZyContainerRequest, ZyContainerResponse};
pub use runtime::{ZyContainerRunSpec, ZyContainerRuntime, ZyDockerCliRuntime};
