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

//! Plugin versions and the constraint expressions dependencies use to
//! restrict them (`>=1.2.0`, `<2`, `==1.0.0`, `^1.2`, `~1.2`, `*`, and
//! comma-joined conjunctions such as `>=1.0, <2.0`).

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Result, ZyError};

/// Plugin version information
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ZyPluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub pre_release: Option<String>,
}

impl ZyPluginVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        ZyPluginVersion {
            major,
            minor,
            patch,
            pre_release: None,
        }
    }

    /// Parse `major.minor.patch[-pre]`.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.trim().split('.').collect();
        if parts.len() < 3 {
            return Err(ZyError::validation(format!(
                "invalid version '{}', expected major.minor.patch",
                version_str
            )));
        }
        Self::from_parts(version_str, &parts)
    }

    /// Parse a possibly abbreviated version (`1`, `1.2`), padding missing
    /// components with zero. Used for constraint bounds.
    pub fn parse_lenient(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 || parts[0].is_empty() {
            return Err(ZyError::validation(format!(
                "invalid version '{}'",
                version_str
            )));
        }
        Self::from_parts(version_str, &parts)
    }

    fn from_parts(raw: &str, parts: &[&str]) -> Result<Self> {
        let number = |s: &str, what: &str| {
            s.parse::<u32>().map_err(|_| {
                ZyError::validation(format!("invalid {} version in '{}'", what, raw))
            })
        };

        let major = number(parts[0], "major")?;
        let minor = match parts.get(1) {
            Some(p) => number(p, "minor")?,
            None => 0,
        };
        let (patch, pre_release) = match parts.get(2) {
            Some(p) => match p.find('-') {
                Some(dash) => (number(&p[..dash], "patch")?, Some(p[dash + 1..].to_string())),
                None => (number(p, "patch")?, None),
            },
            None => (0, None),
        };

        Ok(ZyPluginVersion {
            major,
            minor,
            patch,
            pre_release,
        })
    }
}

/// A pre-release sorts before the release it precedes.
impl Ord for ZyPluginVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for ZyPluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for ZyPluginVersion {
    fn default() -> Self {
        ZyPluginVersion::new(0, 1, 0)
    }
}

impl fmt::Display for ZyPluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pre_release {
            Some(pre) => write!(f, "{}.{}.{}-{}", self.major, self.minor, self.patch, pre),
            None => write!(f, "{}.{}.{}", self.major, self.minor, self.patch),
        }
    }
}

impl Serialize for ZyPluginVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ZyPluginVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ZyPluginVersion::parse_lenient(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ZyComparator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Caret,
    Tilde,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ZyVersionPredicate {
    op: ZyComparator,
    version: ZyPluginVersion,
}

impl ZyVersionPredicate {
    fn matches(&self, candidate: &ZyPluginVersion) -> bool {
        let v = &self.version;
        match self.op {
            ZyComparator::Eq => candidate == v,
            ZyComparator::Gt => candidate > v,
            ZyComparator::Ge => candidate >= v,
            ZyComparator::Lt => candidate < v,
            ZyComparator::Le => candidate <= v,
            ZyComparator::Caret => {
                let upper = if v.major > 0 {
                    ZyPluginVersion::new(v.major + 1, 0, 0)
                } else {
                    ZyPluginVersion::new(0, v.minor + 1, 0)
                };
                candidate >= v && *candidate < upper
            }
            ZyComparator::Tilde => {
                let upper = ZyPluginVersion::new(v.major, v.minor + 1, 0);
                candidate >= v && *candidate < upper
            }
        }
    }
}

/// A conjunction of version predicates. An empty constraint (`*`) matches
/// every version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZyVersionConstraint {
    raw: String,
    predicates: Vec<ZyVersionPredicate>,
}

impl ZyVersionConstraint {
    pub fn any() -> Self {
        ZyVersionConstraint {
            raw: "*".to_string(),
            predicates: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let mut predicates = Vec::new();
        for part in trimmed.split(',') {
            let part = part.trim();
            let (op, rest) = if let Some(r) = part.strip_prefix(">=") {
                (ZyComparator::Ge, r)
            } else if let Some(r) = part.strip_prefix("<=") {
                (ZyComparator::Le, r)
            } else if let Some(r) = part.strip_prefix("==") {
                (ZyComparator::Eq, r)
            } else if let Some(r) = part.strip_prefix('>') {
                (ZyComparator::Gt, r)
            } else if let Some(r) = part.strip_prefix('<') {
                (ZyComparator::Lt, r)
            } else if let Some(r) = part.strip_prefix('=') {
                (ZyComparator::Eq, r)
            } else if let Some(r) = part.strip_prefix('^') {
                (ZyComparator::Caret, r)
            } else if let Some(r) = part.strip_prefix('~') {
                (ZyComparator::Tilde, r)
            } else {
                (ZyComparator::Eq, part)
            };
            let version = ZyPluginVersion::parse_lenient(rest).map_err(|_| {
                ZyError::validation(format!("invalid version constraint '{}'", raw))
            })?;
            predicates.push(ZyVersionPredicate { op, version });
        }

        Ok(ZyVersionConstraint {
            raw: trimmed.to_string(),
            predicates,
        })
    }

    pub fn matches(&self, version: &ZyPluginVersion) -> bool {
        self.predicates.iter().all(|p| p.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ZyVersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for ZyVersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ZyVersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ZyVersionConstraint::parse(&raw).map_err(serde::de::Error::custom)
    }
}
