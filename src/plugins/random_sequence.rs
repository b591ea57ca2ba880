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

//! Random sequence generator.
//!
//! Samples protein, DNA or RNA sequences uniformly from the entity's alphabet
//! and annotates them with simple composition properties. Constraints of the
//! form `metric OP number` are honoured by resampling.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

use crate::capability::{ZyDesignCandidate, ZyDesignRequest, ZyGenerator};
use crate::errors::{Result, ZyError};
use crate::orbit::plugin::{ZyPluginDescriptor, ZyPluginHooks, ZyPluginInstance};
use crate::orbit::version::ZyPluginVersion;

pub const NAME: &str = "random_sequence";
pub const ENTRY_POINT: &str = "zyme.random_sequence";

const DEFAULT_LENGTH: usize = 50;
const MAX_ATTEMPTS: usize = 1000;

const PROTEIN_ALPHABET: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";
const DNA_ALPHABET: &[u8] = b"ACGT";
const RNA_ALPHABET: &[u8] = b"ACGU";

/// Kyte-Doolittle hydropathy index.
fn hydropathy(residue: u8) -> f64 {
    match residue {
        b'A' => 1.8,
        b'R' => -4.5,
        b'N' => -3.5,
        b'D' => -3.5,
        b'C' => 2.5,
        b'Q' => -3.5,
        b'E' => -3.5,
        b'G' => -0.4,
        b'H' => -3.2,
        b'I' => 4.5,
        b'L' => 3.8,
        b'K' => -3.9,
        b'M' => 1.9,
        b'F' => 2.8,
        b'P' => -1.6,
        b'S' => -0.8,
        b'T' => -0.7,
        b'W' => -0.9,
        b'Y' => -1.3,
        b'V' => 4.2,
        _ => 0.0,
    }
}

/// Average residue mass in daltons.
fn residue_mass(residue: u8, entity: ZyEntity) -> f64 {
    match entity {
        ZyEntity::Protein => 110.0,
        ZyEntity::Dna => match residue {
            b'A' => 331.2,
            b'C' => 307.2,
            b'G' => 347.2,
            _ => 322.2,
        },
        ZyEntity::Rna => match residue {
            b'A' => 347.2,
            b'C' => 323.2,
            b'G' => 363.2,
            _ => 324.2,
        },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ZyEntity {
    Protein,
    Dna,
    Rna,
}

impl ZyEntity {
    fn parse(entity: &str) -> Option<Self> {
        match entity.to_ascii_lowercase().as_str() {
            "proteinsequence" | "protein" => Some(ZyEntity::Protein),
            "dnasequence" | "dna" => Some(ZyEntity::Dna),
            "rnasequence" | "rna" => Some(ZyEntity::Rna),
            _ => None,
        }
    }

    fn alphabet(self) -> &'static [u8] {
        match self {
            ZyEntity::Protein => PROTEIN_ALPHABET,
            ZyEntity::Dna => DNA_ALPHABET,
            ZyEntity::Rna => RNA_ALPHABET,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ZyComparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

#[derive(Clone, Debug, PartialEq)]
struct ZyConstraint {
    metric: String,
    op: ZyComparison,
    value: f64,
}

impl ZyConstraint {
    fn parse(raw: &str) -> Option<Self> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(<=|>=|==|<|>)\s*(-?[0-9]*\.?[0-9]+)\s*$").ok())
            .as_ref()?;
        let caps = pattern.captures(raw)?;
        let op = match &caps[2] {
            "<" => ZyComparison::Lt,
            "<=" => ZyComparison::Le,
            ">" => ZyComparison::Gt,
            ">=" => ZyComparison::Ge,
            _ => ZyComparison::Eq,
        };
        Some(ZyConstraint {
            metric: caps[1].to_string(),
            op,
            value: caps[3].parse().ok()?,
        })
    }

    fn holds(&self, actual: f64) -> bool {
        match self.op {
            ZyComparison::Lt => actual < self.value,
            ZyComparison::Le => actual <= self.value,
            ZyComparison::Gt => actual > self.value,
            ZyComparison::Ge => actual >= self.value,
            ZyComparison::Eq => (actual - self.value).abs() < 1e-9,
        }
    }
}

#[derive(Debug, Default)]
pub struct ZyRandomSequenceGenerator;

impl ZyRandomSequenceGenerator {
    pub fn descriptor() -> ZyPluginDescriptor {
        ZyPluginDescriptor::generator(NAME)
            .with_version(ZyPluginVersion::new(0, 1, 0))
            .with_description("uniform random protein, DNA and RNA sequences")
    }

    pub fn factory() -> Result<ZyPluginInstance> {
        Ok(ZyPluginInstance::Generator(Arc::new(ZyRandomSequenceGenerator)))
    }

    fn properties(sequence: &[u8], entity: ZyEntity) -> BTreeMap<String, f64> {
        let len = sequence.len().max(1) as f64;
        let mut props = BTreeMap::new();
        props.insert("length".to_string(), sequence.len() as f64);
        props.insert(
            "molecular_weight".to_string(),
            sequence.iter().map(|r| residue_mass(*r, entity)).sum(),
        );
        match entity {
            ZyEntity::Protein => {
                let h: f64 = sequence.iter().map(|r| hydropathy(*r)).sum();
                props.insert("hydrophobicity".to_string(), h / len);
            }
            ZyEntity::Dna | ZyEntity::Rna => {
                let gc = sequence.iter().filter(|r| matches!(r, b'G' | b'C')).count();
                props.insert("gc_content".to_string(), gc as f64 / len);
            }
        }
        props
    }
}

impl ZyPluginHooks for ZyRandomSequenceGenerator {}

impl ZyGenerator for ZyRandomSequenceGenerator {
    fn generate(&self, request: &ZyDesignRequest) -> Result<Vec<ZyDesignCandidate>> {
        let entity = ZyEntity::parse(&request.entity).ok_or_else(|| {
            ZyError::validation(format!(
                "random_sequence cannot generate entity '{}', expected ProteinSequence, DNASequence or RNASequence",
                request.entity
            ))
        })?;
        let length = request.length.unwrap_or(DEFAULT_LENGTH);
        if length == 0 {
            return Err(ZyError::validation("sequence length must be positive"));
        }

        let mut constraints = Vec::new();
        for raw in &request.constraints {
            match ZyConstraint::parse(raw) {
                Some(c) => constraints.push(c),
                None => log::warn!(
                    "plugin.random_sequence.constraint_ignored: unparseable constraint - constraint={}",
                    raw
                ),
            }
        }

        let alphabet = entity.alphabet();
        let mut rng = SmallRng::from_entropy();
        let mut candidates = Vec::with_capacity(request.count);

        while candidates.len() < request.count {
            let mut accepted = None;
            for _ in 0..MAX_ATTEMPTS {
                let seq: Vec<u8> = (0..length)
                    .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                    .collect();
                let props = Self::properties(&seq, entity);
                let satisfied = constraints.iter().all(|c| {
                    // constraints on metrics this generator does not compute are not checked
                    props.get(&c.metric).map_or(true, |v| c.holds(*v))
                });
                if satisfied {
                    accepted = Some((seq, props));
                    break;
                }
            }

            let (seq, props) = accepted.ok_or_else(|| {
                ZyError::validation(format!(
                    "no sequence satisfying {:?} found after {} attempts",
                    request.constraints, MAX_ATTEMPTS
                ))
            })?;

            let sequence = String::from_utf8_lossy(&seq).into_owned();
            let mut candidate = ZyDesignCandidate::new(sequence, rng.gen_range(0.5..1.0))
                .with_metadata("generator", NAME)
                .with_metadata("entity", request.entity.clone())
                .with_metadata("generated_at", Utc::now().to_rfc3339());
            for (name, value) in props {
                candidate = candidate.with_property(name, value);
            }
            candidates.push(candidate);
        }

        Ok(candidates)
    }
}
