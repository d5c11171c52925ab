//! Assumption registry: named, bounded model parameters and validated assumption sets

mod registry;
pub mod loader;
pub mod names;

pub use registry::{AssumptionKind, AssumptionRegistry, AssumptionSpec};
pub use loader::{load_registry, load_scenarios, DEFAULT_ASSUMPTIONS_PATH, DEFAULT_SCENARIOS_PATH};

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fully populated, validated mapping from assumption name to value
///
/// Only the registry builds these, so every declared assumption carries a
/// concrete in-range value. Two sets are interchangeable only if equal on
/// every key. Serialized as a plain name/value map; deserializing validates
/// it against [`AssumptionRegistry::standard`] and fills absent names with
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct AssumptionSet {
    values: BTreeMap<String, f64>,
}

impl TryFrom<BTreeMap<String, f64>> for AssumptionSet {
    type Error = ValidationError;

    fn try_from(values: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        AssumptionRegistry::standard().build_set(values.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

impl From<AssumptionSet> for BTreeMap<String, f64> {
    fn from(set: AssumptionSet) -> Self {
        set.values
    }
}

impl AssumptionSet {
    pub(crate) fn from_validated(values: BTreeMap<String, f64>) -> Self {
        Self { values }
    }

    /// Value of an assumption, if the registry declared it
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value of an assumption a model stage cannot run without
    pub fn required(&self, name: &str) -> Result<f64, ValidationError> {
        self.get(name).ok_or_else(|| ValidationError::MissingAssumption {
            name: name.to_string(),
        })
    }

    /// Count-typed assumption as an integer
    pub fn required_count(&self, name: &str) -> Result<u32, ValidationError> {
        self.required(name).map(|v| v.max(0.0) as u32)
    }

    /// Iterate over (name, value) in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Names whose values differ between two sets (keys present in either)
    pub fn diff(&self, other: &AssumptionSet) -> Vec<(String, Option<f64>, Option<f64>)> {
        let mut keys: Vec<&String> = self.values.keys().chain(other.values.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|k| {
                let a = self.values.get(k).copied();
                let b = other.values.get(k).copied();
                if a.map(f64::to_bits) != b.map(f64::to_bits) {
                    Some((k.clone(), a, b))
                } else {
                    None
                }
            })
            .collect()
    }
}
