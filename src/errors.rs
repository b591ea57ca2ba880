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

//! # Zyme Error Module
//!
//! This module defines the error type shared by the plugin registry, the
//! execution engine, the data staging layer and the container executor.
//!
//! ## Error Categories
//!
//! - **DependencyMissing**: A plugin declares required dependencies that are
//!   not available. Fatal to that plugin only.
//! - **PluginLoad**: Construction or a lifecycle hook failed; the plugin moves
//!   to the ERROR state while the registry stays usable.
//! - **Execution**: A design/optimize block could not run. Carries the names
//!   of the alternatives the caller could have asked for.
//! - **Container\***: Out-of-process execution failures. Daemon-unavailable and
//!   image-not-found are distinct so callers can fall back to local execution.
//! - **Staging**: A single file failed to materialize. `stage_files`
//!   downgrades it to a warning and passes the original value through.
//!
//! ## Usage
//!
//! ```rust
//! use zyme::errors::{Result, ZyError};
//!
//! fn pick(model: &str, known: &[String]) -> Result<()> {
//!     if !known.iter().any(|k| k == model) {
//!         return Err(ZyError::execution(model, "unknown model", known.to_vec()));
//!     }
//!     Ok(())
//! }
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type used throughout Zyme.
pub type Result<T> = std::result::Result<T, ZyError>;

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "<none>".to_string()
    } else {
        items.join(", ")
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Canonical error enumeration for Zyme.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ZyError {
    /// Errors originating from filesystem or process IO.
    #[error("io error: {0}")]
    Io(String),

    /// Validation errors triggered by invalid parameters or inputs.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// The requested plugin is not registered.
    #[error("plugin '{name}' is not registered (available: {})", list_or_none(.available))]
    PluginNotFound { name: String, available: Vec<String> },

    /// One or more required dependencies of a plugin are unmet.
    #[error("plugin '{plugin}' has unmet dependencies: {}", .missing.join(", "))]
    DependencyMissing { plugin: String, missing: Vec<String> },

    /// Plugin construction or a lifecycle hook failed.
    #[error("plugin '{plugin}' failed to load: {message}")]
    PluginLoad { plugin: String, message: String },

    /// A lifecycle operation is not valid from the plugin's current state.
    #[error("plugin '{plugin}' cannot {action} while {state}")]
    InvalidTransition {
        plugin: String,
        state: String,
        action: String,
    },

    /// A design model or optimization strategy could not be executed.
    #[error("execution of '{target}' failed: {message} (available: {})", list_or_none(.available))]
    Execution {
        target: String,
        message: String,
        available: Vec<String>,
    },

    /// The container daemon could not be reached.
    #[error("container backend unavailable: {0}")]
    ContainerUnavailable(String),

    /// The requested image is not present on the container host.
    #[error("container image '{image}' not found")]
    ContainerImageNotFound { image: String },

    /// The container ran but exited with a non-zero status.
    #[error("container '{image}' exited with code {exit_code}: {logs}")]
    ContainerExit {
        image: String,
        exit_code: i64,
        logs: String,
    },

    /// The container did not finish before the configured deadline.
    #[error("container '{image}' timed out after {timeout_secs}s")]
    ContainerTimeout { image: String, timeout_secs: u64 },

    /// A single file could not be staged.
    #[error("staging of '{file}' failed: {message}")]
    Staging { file: String, message: String },

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for ZyError {
    fn from(err: io::Error) -> Self {
        ZyError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ZyError {
    fn from(err: serde_json::Error) -> Self {
        ZyError::Serde(err.to_string())
    }
}

impl From<serde_yaml::Error> for ZyError {
    fn from(err: serde_yaml::Error) -> Self {
        ZyError::Serde(err.to_string())
    }
}

impl ZyError {
    /// Helper to construct simple validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        ZyError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct execution errors listing the available alternatives.
    pub fn execution(
        target: impl Into<String>,
        message: impl Into<String>,
        available: Vec<String>,
    ) -> Self {
        ZyError::Execution {
            target: target.into(),
            message: message.into(),
            available,
        }
    }

    /// Helper to construct plugin load errors.
    pub fn plugin_load(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        ZyError::PluginLoad {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Helper to construct staging errors.
    pub fn staging(file: impl Into<String>, message: impl Into<String>) -> Self {
        ZyError::Staging {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        ZyError::Internal(message.into())
    }

    /// Whether this container error allows the caller to retry in-process.
    pub fn is_container_fallback(&self) -> bool {
        matches!(
            self,
            ZyError::ContainerUnavailable(_) | ZyError::ContainerImageNotFound { .. }
        )
    }
}
