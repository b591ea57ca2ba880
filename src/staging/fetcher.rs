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

use std::fmt;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use crate::errors::{Result, ZyError};

/// Transport used by the staging manager to materialize a URL at a local path.
pub trait ZyFileFetcher: Send + Sync + fmt::Debug {
    /// Write the resource at `url` to `dest`, returning the number of bytes.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Blocking HTTP(S) fetcher. `file://` URLs are copied from the local disk.
pub struct ZyHttpFetcher {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl fmt::Debug for ZyHttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZyHttpFetcher")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ZyHttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zyme/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ZyError::internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(ZyHttpFetcher { client, timeout })
    }
}

impl ZyFileFetcher for ZyHttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        if let Some(local) = url.strip_prefix("file://") {
            return Ok(std::fs::copy(local, dest)?);
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ZyError::Io(format!("GET failed: {}", e)))?;

        let mut writer = BufWriter::new(File::create(dest)?);
        let bytes = response
            .copy_to(&mut writer)
            .map_err(|e| ZyError::Io(format!("download interrupted: {}", e)))?;
        writer.into_inner().map_err(|e| ZyError::Io(e.to_string()))?.sync_all()?;
        Ok(bytes)
    }
}
