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

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

fn placeholder() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").ok())
        .as_ref()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn substitute_value(value: &Value, params: &Map<String, Value>, used: &mut BTreeSet<String>) -> Value {
    match value {
        Value::String(s) => {
            let Some(pattern) = placeholder() else {
                return value.clone();
            };

            if let Some(caps) = pattern.captures(s) {
                let whole = caps.get(0).map_or(false, |m| m.start() == 0 && m.end() == s.len());
                if whole {
                    if let Some(v) = params.get(&caps[1]) {
                        used.insert(caps[1].to_string());
                        return v.clone();
                    }
                }
            }

            let replaced = pattern.replace_all(s, |caps: &Captures<'_>| match params.get(&caps[1]) {
                Some(v) => {
                    used.insert(caps[1].to_string());
                    text_of(v)
                }
                None => caps[0].to_string(),
            });
            Value::String(replaced.into_owned())
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| substitute_value(v, params, used))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, params, used)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Fill `{{param}}` placeholders of a run template.
///
/// A string that is exactly one placeholder takes the parameter's typed value;
/// embedded placeholders are replaced textually; unknown placeholders are left
/// as written. Parameters the template never references are added at the top
/// level unless the template already has that key.
pub fn substitute(template: &Map<String, Value>, params: &Map<String, Value>) -> Map<String, Value> {
    let mut used = BTreeSet::new();
    let mut out: Map<String, Value> = template
        .iter()
        .map(|(k, v)| (k.clone(), substitute_value(v, params, &mut used)))
        .collect();

    for (name, value) in params {
        if !used.contains(name) && !out.contains_key(name) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}
