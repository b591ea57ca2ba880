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

//! # Search Space Module
//!
//! Parses the parameter domains of an optimize block:
//!
//! - `range(a,b)`: numeric interval, integer-valued when both bounds are integers
//! - `choice([...])`: finite set of JSON values (single quotes are accepted)

use std::collections::BTreeMap;
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Result, ZyError};

fn range_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^range\(\s*([-+0-9.eE]+)\s*,\s*([-+0-9.eE]+)\s*\)$").ok())
        .as_ref()
}

fn choice_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^choice\(\s*(\[.*\])\s*\)$").ok())
        .as_ref()
}

/// Domain of a single tunable parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZyParameterDomain {
    Range { low: f64, high: f64, integer: bool },
    Choice(Vec<Value>),
}

impl ZyParameterDomain {
    pub fn parse(expression: &str) -> Result<Self> {
        let expr = expression.trim();

        if let Some(caps) = range_pattern().and_then(|p| p.captures(expr)) {
            let (raw_low, raw_high) = (&caps[1], &caps[2]);
            let bound = |raw: &str| {
                raw.parse::<f64>().map_err(|_| {
                    ZyError::validation(format!("invalid range bound '{}' in '{}'", raw, expr))
                })
            };
            let low = bound(raw_low)?;
            let high = bound(raw_high)?;
            if !low.is_finite() || !high.is_finite() || low > high {
                return Err(ZyError::validation(format!(
                    "range lower bound must not exceed upper bound in '{}'",
                    expr
                )));
            }
            let integer = raw_low.parse::<i64>().is_ok() && raw_high.parse::<i64>().is_ok();
            return Ok(ZyParameterDomain::Range { low, high, integer });
        }

        if let Some(caps) = choice_pattern().and_then(|p| p.captures(expr)) {
            let values: Vec<Value> = serde_json::from_str(&caps[1])
                .or_else(|_| serde_json::from_str(&single_quotes_to_json(&caps[1])))
                .map_err(|e| {
                    ZyError::validation(format!("invalid choice list in '{}': {}", expr, e))
                })?;
            if values.is_empty() {
                return Err(ZyError::validation(format!(
                    "choice list must not be empty in '{}'",
                    expr
                )));
            }
            return Ok(ZyParameterDomain::Choice(values));
        }

        Err(ZyError::validation(format!(
            "unsupported search space expression '{}', expected range(a,b) or choice([...])",
            expr
        )))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Value {
        match self {
            ZyParameterDomain::Range { low, high, integer } => {
                if *integer {
                    let v = rng.gen_range((*low as i64)..=(*high as i64));
                    Value::from(v)
                } else if low == high {
                    Value::from(*low)
                } else {
                    Value::from(rng.gen_range(*low..*high))
                }
            }
            ZyParameterDomain::Choice(values) => {
                let idx = rng.gen_range(0..values.len());
                values[idx].clone()
            }
        }
    }

    /// Clamp a numeric value into the range, rounding integer ranges.
    pub fn clamp(&self, value: f64) -> Value {
        match self {
            ZyParameterDomain::Range { low, high, integer } => {
                let v = value.clamp(*low, *high);
                if *integer {
                    Value::from(v.round() as i64)
                } else {
                    Value::from(v)
                }
            }
            ZyParameterDomain::Choice(_) => Value::from(value),
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        match self {
            ZyParameterDomain::Range { low, high, integer } => match value.as_f64() {
                Some(v) => {
                    v >= *low && v <= *high && (!*integer || value.is_i64() || value.is_u64())
                }
                None => false,
            },
            ZyParameterDomain::Choice(values) => values.contains(value),
        }
    }
}

/// Named parameter domains of an optimize block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ZySearchSpace {
    pub parameters: BTreeMap<String, ZyParameterDomain>,
}

impl ZySearchSpace {
    pub fn parse(expressions: &BTreeMap<String, String>) -> Result<Self> {
        let mut parameters = BTreeMap::new();
        for (name, expr) in expressions {
            let domain = ZyParameterDomain::parse(expr).map_err(|e| {
                ZyError::validation(format!("search space parameter '{}': {}", name, e))
            })?;
            parameters.insert(name.clone(), domain);
        }
        Ok(ZySearchSpace { parameters })
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ZyParameterDomain> {
        self.parameters.get(name)
    }

    /// One independent sample per parameter.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Map<String, Value> {
        self.parameters
            .iter()
            .map(|(name, domain)| (name.clone(), domain.sample(rng)))
            .collect()
    }

    pub fn contains(&self, parameters: &Map<String, Value>) -> bool {
        self.parameters
            .iter()
            .all(|(name, domain)| parameters.get(name).map_or(false, |v| domain.contains(v)))
    }
}

/// Rewrite single-quoted string literals as JSON strings. Quotes inside
/// double-quoted strings are left alone.
fn single_quotes_to_json(list: &str) -> String {
    let mut out = String::with_capacity(list.len());
    let mut chars = list.chars();
    let mut quote: Option<char> = None;
    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '\'') => {
                quote = Some('\'');
                out.push('"');
            }
            (None, '"') => {
                quote = Some('"');
                out.push('"');
            }
            (None, _) => out.push(c),
            (Some(q), '\\') => match chars.next() {
                Some('\'') if q == '\'' => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            (Some('\''), '\'') => {
                quote = None;
                out.push('"');
            }
            (Some('\''), '"') => out.push_str("\\\""),
            (Some('"'), '"') => {
                quote = None;
                out.push('"');
            }
            (Some(_), _) => out.push(c),
        }
    }
    out
}
