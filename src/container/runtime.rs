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
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::errors::{Result, ZyError};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything needed to start one detached container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZyContainerRunSpec {
    pub image: String,
    /// `(host path, container path)` bind mounts.
    pub mounts: Vec<(PathBuf, String)>,
    pub workdir: String,
    pub env: BTreeMap<String, String>,
    /// Runtime flags placed before the image name.
    pub extra_args: Vec<String>,
    /// Command and arguments placed after the image name; empty uses the
    /// image entrypoint.
    pub command: Vec<String>,
}

/// Client of a container daemon.
pub trait ZyContainerRuntime: Send + Sync + fmt::Debug {
    fn is_available(&self) -> bool;

    fn image_exists(&self, image: &str) -> Result<bool>;

    /// Start a detached container and return its id.
    fn run(&self, spec: &ZyContainerRunSpec) -> Result<String>;

    /// Block until the container exits. `Ok(None)` means the deadline passed.
    fn wait(&self, id: &str, timeout: Duration) -> Result<Option<i64>>;

    fn logs(&self, id: &str) -> Result<String>;

    /// Force-remove the container.
    fn remove(&self, id: &str) -> Result<()>;
}

/// Runtime driving the `docker` CLI (or a compatible binary such as `podman`).
#[derive(Clone, Debug)]
pub struct ZyDockerCliRuntime {
    binary: String,
}

impl Default for ZyDockerCliRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

fn classify_failure(image: &str, output: &Output) -> ZyError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("cannot connect") || lower.contains("is the docker daemon running") {
        ZyError::ContainerUnavailable(stderr)
    } else if lower.contains("unable to find image")
        || lower.contains("pull access denied")
        || lower.contains("no such image")
    {
        ZyError::ContainerImageNotFound {
            image: image.to_string(),
        }
    } else {
        ZyError::Io(format!(
            "container command failed with {}: {}",
            output.status, stderr
        ))
    }
}

impl ZyDockerCliRuntime {
    pub fn new(binary: impl Into<String>) -> Self {
        ZyDockerCliRuntime {
            binary: binary.into(),
        }
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                ZyError::ContainerUnavailable(format!("failed to execute '{}': {}", self.binary, e))
            })
    }

    fn run_args(spec: &ZyContainerRunSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];
        for (host, target) in &spec.mounts {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host.to_string_lossy(), target));
        }
        if !spec.workdir.is_empty() {
            args.push("-w".to_string());
            args.push(spec.workdir.clone());
        }
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.extend(spec.extra_args.iter().cloned());
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

impl ZyContainerRuntime for ZyDockerCliRuntime {
    fn is_available(&self) -> bool {
        match self.output(&["info", "--format", "{{.ServerVersion}}"]) {
            Ok(output) => output.status.success(),
            Err(e) => {
                log::debug!("container.runtime.unavailable: {}", e);
                false
            }
        }
    }

    fn image_exists(&self, image: &str) -> Result<bool> {
        let output = self.output(&["image", "inspect", "--format", "{{.Id}}", image])?;
        if output.status.success() {
            return Ok(true);
        }
        match classify_failure(image, &output) {
            ZyError::ContainerUnavailable(msg) => Err(ZyError::ContainerUnavailable(msg)),
            _ => Ok(false),
        }
    }

    fn run(&self, spec: &ZyContainerRunSpec) -> Result<String> {
        let args = Self::run_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.output(&arg_refs)?;
        if !output.status.success() {
            return Err(classify_failure(&spec.image, &output));
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(ZyError::Io("container runtime returned no container id".to_string()));
        }
        Ok(id)
    }

    fn wait(&self, id: &str, timeout: Duration) -> Result<Option<i64>> {
        let mut child = Command::new(&self.binary)
            .args(["wait", id])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ZyError::ContainerUnavailable(format!("failed to execute '{}': {}", self.binary, e)))?;

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    let mut stdout = String::new();
                    if let Some(mut out) = child.stdout.take() {
                        out.read_to_string(&mut stdout)?;
                    }
                    if !status.success() {
                        let mut stderr = String::new();
                        if let Some(mut err) = child.stderr.take() {
                            err.read_to_string(&mut stderr)?;
                        }
                        return Err(ZyError::Io(format!(
                            "wait for container {} failed: {}",
                            id,
                            stderr.trim()
                        )));
                    }
                    let code = stdout.trim().parse::<i64>().map_err(|_| {
                        ZyError::Io(format!("unexpected wait output '{}'", stdout.trim()))
                    })?;
                    return Ok(Some(code));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = self.output(&["kill", id]);
                        return Ok(None);
                    }
                    thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
            }
        }
    }

    fn logs(&self, id: &str) -> Result<String> {
        let output = self.output(&["logs", id])?;
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    fn remove(&self, id: &str) -> Result<()> {
        let output = self.output(&["rm", "-f", id])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ZyError::Io(format!(
                "failed to remove container {}: {}",
                id,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}
