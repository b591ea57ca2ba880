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

//! # Data Staging
//!
//! Workflows reference input files by logical name; the workflow's file
//! manifest maps each name to a (signed) URL. A [`ZyDataStagingManager`] owns
//! one run-scoped temp directory, downloads referenced files into it and
//! rewrites block parameters to the local paths. The directory is removed by
//! [`ZyDataStagingManager::cleanup`] or when the manager is dropped.

pub mod fetcher;

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::config::ZyStagingConfig;
use crate::errors::{Result, ZyError};

pub use fetcher::{ZyFileFetcher, ZyHttpFetcher};

/// A file materialized in the run directory. Valid only while its manager
/// has not been cleaned up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZyStagedFile {
    pub logical_name: String,
    pub local_path: PathBuf,
    pub bytes: u64,
    /// BLAKE3 digest of the content, hex encoded.
    pub digest: String,
}

fn digest_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}

#[derive(Debug)]
pub struct ZyDataStagingManager {
    temp_dir: Option<TempDir>,
    fetcher: Arc<dyn ZyFileFetcher>,
    staged: HashMap<String, ZyStagedFile>,
}

impl ZyDataStagingManager {
    /// Create the run directory under the configured root (or the system
    /// temp dir).
    pub fn new(config: &ZyStagingConfig, fetcher: Arc<dyn ZyFileFetcher>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&config.dir_prefix);
        let temp_dir = match &config.root_dir {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        log::debug!(
            "staging.dir.created: run directory created - path={}",
            temp_dir.path().to_string_lossy()
        );

        Ok(ZyDataStagingManager {
            temp_dir: Some(temp_dir),
            fetcher,
            staged: HashMap::new(),
        })
    }

    /// The run directory, or `None` once cleaned up.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    pub fn staged_files(&self) -> Vec<&ZyStagedFile> {
        let mut files: Vec<&ZyStagedFile> = self.staged.values().collect();
        files.sort_by(|a, b| a.logical_name.cmp(&b.logical_name));
        files
    }

    /// Download a single file into the run directory. A name that was
    /// already staged reuses the existing local copy.
    pub fn stage_file(&mut self, filename: &str, url: &str) -> Result<ZyStagedFile> {
        if let Some(existing) = self.staged.get(filename) {
            return Ok(existing.clone());
        }

        let dir = self
            .temp_dir()
            .ok_or_else(|| ZyError::staging(filename, "staging manager already cleaned up"))?
            .to_path_buf();

        let dest = self.local_path_for(&dir, filename)?;
        let preexisting = dest.exists();

        let bytes = match self.fetcher.fetch(url, &dest) {
            Ok(bytes) => bytes,
            Err(e) => {
                if !preexisting && dest.exists() {
                    let _ = std::fs::remove_file(&dest);
                }
                return Err(ZyError::staging(filename, e.to_string()));
            }
        };

        let digest = digest_file(&dest).map_err(|e| ZyError::staging(filename, e.to_string()))?;
        let staged = ZyStagedFile {
            logical_name: filename.to_string(),
            local_path: dest,
            bytes,
            digest,
        };

        log::info!(
            "staging.file.staged: file staged - file={}, path={}, bytes={}",
            filename,
            staged.local_path.to_string_lossy(),
            bytes
        );
        self.staged.insert(filename.to_string(), staged.clone());
        Ok(staged)
    }

    /// Local path for a logical name. The basename is used directly unless a
    /// different name already owns it, in which case the file goes into a
    /// subdirectory keyed by the BLAKE3 hash of the logical name.
    fn local_path_for(&self, dir: &Path, filename: &str) -> Result<PathBuf> {
        let base = Path::new(filename)
            .file_name()
            .ok_or_else(|| ZyError::staging(filename, "file name has no final component"))?;

        let direct = dir.join(base);
        if !self.staged.values().any(|f| f.local_path == direct) {
            return Ok(direct);
        }

        let hash = blake3::hash(filename.as_bytes()).to_hex();
        let subdir = dir.join(&hash.as_str()[..16]);
        std::fs::create_dir_all(&subdir).map_err(|e| ZyError::staging(filename, e.to_string()))?;
        Ok(subdir.join(base))
    }

    /// Rewrite every parameter whose value is exactly a manifest key to the
    /// local path of the staged file. Other values pass through unchanged,
    /// as does the original value of a file that failed to stage.
    pub fn stage_files(
        &mut self,
        params: &Map<String, Value>,
        manifest: &BTreeMap<String, String>,
    ) -> Map<String, Value> {
        let mut out = Map::with_capacity(params.len());
        for (key, value) in params {
            let url = value.as_str().and_then(|name| manifest.get(name).map(|url| (name, url)));
            let rewritten = match url {
                Some((name, url)) => match self.stage_file(name, url) {
                    Ok(staged) => Value::String(staged.local_path.to_string_lossy().into_owned()),
                    Err(e) => {
                        log::warn!(
                            "staging.file.failed: keeping original parameter value - param={}, file={}, error={}",
                            key,
                            name,
                            e
                        );
                        value.clone()
                    }
                },
                None => value.clone(),
            };
            out.insert(key.clone(), rewritten);
        }
        out
    }

    /// Remove the run directory. Never fails; an already missing directory
    /// is fine.
    pub fn cleanup(&mut self) {
        self.staged.clear();
        let Some(dir) = self.temp_dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => log::debug!(
                "staging.dir.removed: run directory removed - path={}",
                path.to_string_lossy()
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "staging.dir.cleanup_failed: could not remove run directory - path={}, error={}",
                path.to_string_lossy(),
                e
            ),
        }
    }
}

impl Drop for ZyDataStagingManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}
