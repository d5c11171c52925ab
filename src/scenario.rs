//! Scenario comparator: named override sets, parallel runs, comparison tables
//! and one-at-a-time sensitivity (tornado) analysis
//!
//! Holds the registry and base assumptions once, then resolves each scenario by
//! layering its overrides on the base. Runs go through the projection cache, so
//! repeated scenarios and perturbations that land on an existing set are free.

use crate::assumptions::{names, AssumptionRegistry, AssumptionSet};
use crate::cache::ProjectionCache;
use crate::error::{ProjectionError, Result, ValidationError};
use crate::projection::{project, Metric, Period, ProjectionRun, TimeGrid};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::sync::Arc;

/// A name plus overrides layered on a base assumption set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub overrides: BTreeMap<String, f64>,
}

impl Scenario {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            overrides: BTreeMap::new(),
        }
    }

    /// Builder-style override
    pub fn with(mut self, assumption: &str, value: f64) -> Self {
        self.overrides.insert(assumption.to_string(), value);
        self
    }

    /// The base case: no overrides
    pub fn base() -> Self {
        Self::new("base")
    }

    /// Built-in scenarios, mirrored by `data/scenarios/scenarios.csv`
    pub fn presets() -> Vec<Scenario> {
        vec![
            Self::base(),
            Self::new("bear")
                .with(names::GROWTH_RATE, 0.04)
                .with(names::DEFAULT_RATE_BASE, 0.10)
                .with(names::FRAUD_REDUCTION_FRACTION, 0.90)
                .with(names::CAPITAL_INFLOW_RATE, 0.02),
            Self::new("bull")
                .with(names::GROWTH_RATE, 0.12)
                .with(names::SATURATION, 0.002)
                .with(names::REPEAT_BORROW_RATE, 0.3)
                .with(names::CAPITAL_INFLOW_RATE, 0.08),
            Self::new("conservative_growth")
                .with(names::GROWTH_RATE, 0.03)
                .with(names::INITIAL_USERS, 500.0),
            Self::new("aggressive_growth")
                .with(names::GROWTH_RATE, 0.15)
                .with(names::INITIAL_USERS, 2000.0),
            Self::new("high_yield")
                .with(names::INTEREST_SPREAD, 0.25)
                .with(names::FEE_RATE, 0.15),
            Self::new("low_fees")
                .with(names::INTEREST_SPREAD, 0.15)
                .with(names::FEE_RATE, 0.08),
        ]
    }

    pub fn preset(name: &str) -> Option<Scenario> {
        Self::presets().into_iter().find(|s| s.name == name)
    }

    /// Fully resolved assumption set for this scenario
    pub fn resolve(&self, registry: &AssumptionRegistry, base: &AssumptionSet) -> std::result::Result<AssumptionSet, ValidationError> {
        registry.layer(base, self.overrides.iter().map(|(k, v)| (k.as_str(), *v)))
    }
}

/// Runs scenarios against one registry and base set
#[derive(Debug, Clone)]
pub struct ScenarioComparator {
    registry: AssumptionRegistry,
    base: AssumptionSet,
    cache: Arc<ProjectionCache>,
}

impl ScenarioComparator {
    /// Comparator over registry defaults, sharing the process-wide cache
    pub fn new(registry: AssumptionRegistry) -> Self {
        let base = registry.defaults();
        Self {
            registry,
            base,
            cache: ProjectionCache::global(),
        }
    }

    /// Comparator over an explicit base set
    pub fn with_base(registry: AssumptionRegistry, base: AssumptionSet) -> Self {
        Self {
            registry,
            base,
            cache: ProjectionCache::global(),
        }
    }

    /// Use a private cache instead of the process-wide one
    pub fn with_cache(mut self, cache: Arc<ProjectionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn registry(&self) -> &AssumptionRegistry {
        &self.registry
    }

    pub fn base(&self) -> &AssumptionSet {
        &self.base
    }

    pub fn cache(&self) -> &Arc<ProjectionCache> {
        &self.cache
    }

    /// Resolve and run a single scenario
    pub fn run_one(&self, scenario: &Scenario, grid: &TimeGrid) -> Result<Arc<ProjectionRun>> {
        let set = scenario.resolve(&self.registry, &self.base)?;
        self.run_set(&set, grid)
    }

    fn run_set(&self, set: &AssumptionSet, grid: &TimeGrid) -> Result<Arc<ProjectionRun>> {
        self.cache.get_or_compute(set, grid, project)
    }

    /// Run every scenario in parallel, keeping each scenario's outcome separate.
    ///
    /// A scenario that fails validation only loses its own entry; the others
    /// still carry their runs. Names must be unique.
    pub fn run_each(
        &self,
        scenarios: &[Scenario],
        grid: &TimeGrid,
    ) -> Result<BTreeMap<String, Result<Arc<ProjectionRun>>>> {
        let mut seen = BTreeSet::new();
        for scenario in scenarios {
            if !seen.insert(scenario.name.as_str()) {
                return Err(ProjectionError::DuplicateScenario(scenario.name.clone()));
            }
        }

        log::info!(
            "Running {} scenarios over {} {} periods",
            scenarios.len(),
            grid.len(),
            grid.cadence()
        );

        let results: BTreeMap<String, Result<Arc<ProjectionRun>>> = scenarios
            .par_iter()
            .map(|scenario| (scenario.name.clone(), self.run_one(scenario, grid)))
            .collect();

        for (name, run) in &results {
            if let Err(e) = run {
                log::warn!("Scenario '{}' failed: {}", name, e);
            }
        }
        Ok(results)
    }

    /// Run every scenario in parallel, all or nothing.
    ///
    /// Returns the first failure in input order when any scenario fails; use
    /// [`ScenarioComparator::run_each`] to keep the successful runs.
    pub fn run_scenarios(&self, scenarios: &[Scenario], grid: &TimeGrid) -> Result<BTreeMap<String, Arc<ProjectionRun>>> {
        let mut results = self.run_each(scenarios, grid)?;

        let mut runs = BTreeMap::new();
        for scenario in scenarios {
            match results.remove(&scenario.name) {
                Some(Ok(run)) => {
                    runs.insert(scenario.name.clone(), run);
                }
                Some(Err(e)) => return Err(e),
                None => {}
            }
        }
        Ok(runs)
    }

    /// One-at-a-time tornado analysis around `base_scenario`.
    ///
    /// Each named assumption is moved to its registered min and max with
    /// everything else held at the scenario's values; the change in `metric_name`
    /// at the horizon period is recorded. An empty `perturbations` list means
    /// every registered assumption. Entries are ordered by descending swing.
    pub fn sensitivity(
        &self,
        base_scenario: &Scenario,
        perturbations: &[&str],
        metric_name: &str,
        grid: &TimeGrid,
    ) -> Result<Vec<SensitivityEntry>> {
        let metric: Metric = metric_name.parse()?;
        let base_set = base_scenario.resolve(&self.registry, &self.base)?;

        let targets: Vec<&str> = if perturbations.is_empty() {
            self.registry.specs().map(|s| s.name.as_str()).collect()
        } else {
            perturbations.to_vec()
        };

        let mut cases = Vec::with_capacity(targets.len());
        for name in targets {
            let spec = self
                .registry
                .spec(name)
                .ok_or_else(|| ValidationError::UnknownAssumption { name: name.to_string() })?;
            let low = self.registry.layer(&base_set, [(name, spec.min)])?;
            let high = self.registry.layer(&base_set, [(name, spec.max)])?;
            cases.push((spec, low, high));
        }

        let base_run = self.run_set(&base_set, grid)?;
        let base_value = horizon_value(&base_run, metric);

        log::info!(
            "Sensitivity of {} on '{}': {} assumptions",
            metric,
            base_scenario.name,
            cases.len()
        );

        let mut entries = cases
            .par_iter()
            .map(|(spec, low, high)| -> Result<SensitivityEntry> {
                let low_run = self.run_set(low, grid)?;
                let high_run = self.run_set(high, grid)?;
                let low_value = horizon_value(&low_run, metric);
                let high_value = horizon_value(&high_run, metric);
                Ok(SensitivityEntry {
                    assumption: spec.name.clone(),
                    base_input: base_set.get(&spec.name).unwrap_or(spec.default),
                    low_input: spec.min,
                    high_input: spec.max,
                    base_value,
                    low_value,
                    high_value,
                    delta_low: low_value - base_value,
                    delta_high: high_value - base_value,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        entries.sort_by(|a, b| {
            b.swing()
                .total_cmp(&a.swing())
                .then_with(|| a.assumption.cmp(&b.assumption))
        });
        Ok(entries)
    }
}

impl Default for ScenarioComparator {
    fn default() -> Self {
        Self::new(AssumptionRegistry::standard())
    }
}

fn horizon_value(run: &ProjectionRun, metric: Metric) -> f64 {
    run.horizon_value(metric).unwrap_or(0.0)
}

/// Impact range of one assumption on the target metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityEntry {
    pub assumption: String,
    pub base_input: f64,
    pub low_input: f64,
    pub high_input: f64,
    /// Metric at the horizon with every assumption at base
    pub base_value: f64,
    pub low_value: f64,
    pub high_value: f64,
    pub delta_low: f64,
    pub delta_high: f64,
}

impl SensitivityEntry {
    /// Width of the tornado bar
    pub fn swing(&self) -> f64 {
        (self.delta_high - self.delta_low).abs()
    }
}

/// Period × scenario table of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonTable {
    pub metric: Metric,
    pub scenarios: Vec<String>,
    pub rows: Vec<ComparisonRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub period: Period,
    /// One entry per scenario, in `ComparisonTable::scenarios` order;
    /// `None` where that scenario's grid is shorter
    pub values: Vec<Option<f64>>,
}

impl ComparisonTable {
    pub fn value(&self, period: usize, scenario: &str) -> Option<f64> {
        let column = self.scenarios.iter().position(|s| s == scenario)?;
        self.rows.get(period)?.values.get(column).copied().flatten()
    }

    /// Write as CSV: `period,date,<scenario>...`
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);

        let mut header = vec!["period".to_string(), "date".to_string()];
        header.extend(self.scenarios.iter().cloned());
        out.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.period.index.to_string(), row.period.start.to_string()];
            record.extend(row.values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            out.write_record(&record)?;
        }

        out.flush()?;
        Ok(())
    }
}

/// Tabulate one metric across runs
pub fn compare(runs: &BTreeMap<String, Arc<ProjectionRun>>, metric_name: &str) -> Result<ComparisonTable> {
    let metric: Metric = metric_name.parse()?;
    let scenarios: Vec<String> = runs.keys().cloned().collect();

    let longest = runs.values().max_by_key(|run| run.grid.len());
    let rows = match longest {
        Some(reference) => reference
            .grid
            .periods()
            .map(|period| ComparisonRow {
                period,
                values: runs
                    .values()
                    .map(|run| run.value(metric, period.index as usize))
                    .collect(),
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(ComparisonTable { metric, scenarios, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::{load_scenarios, DEFAULT_SCENARIOS_PATH};
    use chrono::NaiveDate;
    use std::path::Path;

    fn grid(periods: u32) -> TimeGrid {
        TimeGrid::monthly(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), periods).unwrap()
    }

    fn comparator() -> ScenarioComparator {
        ScenarioComparator::default().with_cache(Arc::new(ProjectionCache::new()))
    }

    #[test]
    fn test_presets_resolve() {
        let registry = AssumptionRegistry::standard();
        let base = registry.defaults();
        for scenario in Scenario::presets() {
            let set = scenario.resolve(&registry, &base).unwrap();
            for (name, value) in &scenario.overrides {
                assert_eq!(set.get(name), Some(*value));
            }
        }
        assert!(Scenario::preset("bear").is_some());
        assert!(Scenario::preset("sideways").is_none());
    }

    #[test]
    fn test_presets_match_scenario_file() {
        let loaded = load_scenarios(Path::new(DEFAULT_SCENARIOS_PATH)).unwrap();
        assert_eq!(loaded, Scenario::presets());
    }

    #[test]
    fn test_run_scenarios_batch() {
        let comparator = comparator();
        let runs = comparator.run_scenarios(&Scenario::presets(), &grid(24)).unwrap();
        assert_eq!(runs.len(), 7);

        // Bear grows slower than base, bull faster
        let users = |name: &str| runs[name].horizon_value(Metric::ActiveUsers).unwrap();
        assert!(users("bear") < users("base"));
        assert!(users("bull") > users("base"));

        // Richer pricing earns more on the same book
        let gross = |name: &str| runs[name].series(Metric::GrossRevenue).unwrap().total();
        assert!(gross("high_yield") > gross("base"));
        assert!(gross("low_fees") < gross("base"));
    }

    #[test]
    fn test_duplicate_scenarios_rejected() {
        let scenarios = vec![Scenario::base(), Scenario::new("base").with(names::FEE_RATE, 0.2)];
        assert!(matches!(
            comparator().run_scenarios(&scenarios, &grid(6)),
            Err(ProjectionError::DuplicateScenario(name)) if name == "base"
        ));
    }

    #[test]
    fn test_invalid_override_fails_before_running() {
        let comparator = comparator();
        let bad = Scenario::new("bad").with(names::YIELD_RATE, 0.9);
        let result = comparator.run_scenarios(&[Scenario::base(), bad], &grid(6));

        match result {
            Err(ProjectionError::Validation(err)) => assert_eq!(err.assumption(), names::YIELD_RATE),
            other => panic!("expected validation error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_run_each_keeps_valid_scenarios() {
        let comparator = comparator();
        let bad = Scenario::new("bad").with(names::YIELD_RATE, 0.9);
        let results = comparator
            .run_each(&[Scenario::base(), bad, Scenario::preset("bull").unwrap()], &grid(6))
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results["base"].is_ok());
        assert!(results["bull"].is_ok());
        assert!(matches!(&results["bad"], Err(ProjectionError::Validation(_))));
    }

    #[test]
    fn test_identical_scenarios_share_a_run() {
        let comparator = comparator();
        let scenarios = vec![Scenario::base(), Scenario::new("copy")];
        let runs = comparator.run_scenarios(&scenarios, &grid(12)).unwrap();

        assert!(Arc::ptr_eq(&runs["base"], &runs["copy"]));
        assert_eq!(comparator.cache().misses(), 1);
    }

    #[test]
    fn test_compare_table() {
        let comparator = comparator();
        let scenarios = vec![Scenario::base(), Scenario::preset("low_fees").unwrap()];
        let runs = comparator.run_scenarios(&scenarios, &grid(12)).unwrap();

        let table = compare(&runs, "net_revenue").unwrap();
        assert_eq!(table.scenarios, vec!["base".to_string(), "low_fees".to_string()]);
        assert_eq!(table.rows.len(), 12);
        assert_eq!(
            table.value(11, "base"),
            runs["base"].value(Metric::NetRevenue, 11)
        );
        assert!(table.value(12, "base").is_none());

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("period,date,base,low_fees\n0,2025-01-01,"));
        assert_eq!(text.lines().count(), 13);
    }

    #[test]
    fn test_compare_unknown_metric() {
        let runs = BTreeMap::new();
        assert!(matches!(
            compare(&runs, "tvl"),
            Err(ProjectionError::UnknownMetric(name)) if name == "tvl"
        ));
    }

    #[test]
    fn test_yield_sensitivity_direction() {
        let entries = comparator()
            .sensitivity(&Scenario::base(), &[names::YIELD_RATE], "net_revenue", &grid(12))
            .unwrap();
        assert_eq!(entries.len(), 1);

        let yield_entry = &entries[0];
        // Yield is a cost: cheaper capital raises net revenue, dearer capital lowers it
        assert!(yield_entry.delta_low > 0.0);
        assert!(yield_entry.delta_high < 0.0);
        assert!(yield_entry.delta_high.abs() > yield_entry.delta_low.abs());
    }

    #[test]
    fn test_sensitivity_ordered_by_swing() {
        let entries = comparator()
            .sensitivity(
                &Scenario::base(),
                &[names::FEE_RATE, names::YIELD_RATE, names::RECOVERY_RATE],
                "net_revenue",
                &grid(12),
            )
            .unwrap();

        assert_eq!(entries.len(), 3);
        for pair in entries.windows(2) {
            assert!(pair[0].swing() >= pair[1].swing());
        }
        // With fraud reduction at 99% recoveries barely move the result
        assert_eq!(entries[2].assumption, names::RECOVERY_RATE);
    }

    #[test]
    fn test_sensitivity_rejects_unknown_assumption() {
        let result = comparator().sensitivity(&Scenario::base(), &["tvl"], "net_revenue", &grid(6));
        assert!(matches!(
            result,
            Err(ProjectionError::Validation(ValidationError::UnknownAssumption { .. }))
        ));

        let result = comparator().sensitivity(&Scenario::base(), &[names::FEE_RATE], "tvl", &grid(6));
        assert!(matches!(result, Err(ProjectionError::UnknownMetric(_))));
    }
}
