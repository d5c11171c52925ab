//! CSV-based registry and scenario loader
//!
//! Registry declarations live in data/assumptions/registry.csv and scenario
//! overrides in data/scenarios/scenarios.csv.

use super::{AssumptionKind, AssumptionRegistry, AssumptionSpec};
use crate::error::{ProjectionError, Result};
use crate::scenario::Scenario;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Default path to assumptions directory
pub const DEFAULT_ASSUMPTIONS_PATH: &str = "data/assumptions";

/// Default path to scenario definitions
pub const DEFAULT_SCENARIOS_PATH: &str = "data/scenarios/scenarios.csv";

/// Registry file name inside the assumptions directory
pub const REGISTRY_FILE: &str = "registry.csv";

#[derive(Debug, serde::Deserialize)]
struct RegistryRow {
    name: String,
    kind: String,
    min: f64,
    max: f64,
    default: f64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, serde::Deserialize)]
struct ScenarioRow {
    scenario: String,
    #[serde(default)]
    assumption: String,
    #[serde(default)]
    value: Option<f64>,
}

/// Load the registry from `<dir>/registry.csv`
pub fn load_registry(dir: &Path) -> Result<AssumptionRegistry> {
    let file = File::open(dir.join(REGISTRY_FILE))?;
    load_registry_from_reader(file)
}

/// Load registry declarations from any CSV reader
pub fn load_registry_from_reader<R: Read>(reader: R) -> Result<AssumptionRegistry> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut registry = AssumptionRegistry::empty();

    for result in reader.deserialize() {
        let row: RegistryRow = result?;
        let kind: AssumptionKind = row.kind.parse()?;
        registry.register(AssumptionSpec {
            name: row.name.trim().to_string(),
            kind,
            min: row.min,
            max: row.max,
            default: row.default,
            description: row.description,
        })?;
    }

    log::debug!("Loaded {} assumption declarations", registry.len());
    Ok(registry)
}

/// Load scenarios from a long-format CSV (`scenario,assumption,value`)
///
/// Scenarios keep their first-appearance order. A row with an empty
/// assumption column declares a scenario with no overrides.
pub fn load_scenarios(path: &Path) -> Result<Vec<Scenario>> {
    let file = File::open(path)?;
    load_scenarios_from_reader(file, &path.display().to_string())
}

/// Load scenarios from any CSV reader
pub fn load_scenarios_from_reader<R: Read>(reader: R, source: &str) -> Result<Vec<Scenario>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut scenarios: Vec<Scenario> = Vec::new();

    for result in reader.deserialize() {
        let row: ScenarioRow = result?;
        let name = row.scenario.trim();
        if name.is_empty() {
            return Err(ProjectionError::Parse {
                file: source.to_string(),
                value: row.scenario,
                reason: "scenario name is empty".to_string(),
            });
        }

        let idx = match scenarios.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                scenarios.push(Scenario::new(name));
                scenarios.len() - 1
            }
        };

        let assumption = row.assumption.trim();
        if assumption.is_empty() {
            continue;
        }
        let value = row.value.ok_or_else(|| ProjectionError::Parse {
            file: source.to_string(),
            value: assumption.to_string(),
            reason: format!("missing value for '{}' in scenario '{}'", assumption, name),
        })?;
        scenarios[idx].overrides.insert(assumption.to_string(), value);
    }

    log::debug!("Loaded {} scenarios from {}", scenarios.len(), source);
    Ok(scenarios)
}
