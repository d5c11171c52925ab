//! Declared assumptions with semantic types, bounds and defaults

use super::names;
use super::AssumptionSet;
use crate::error::{ProjectionError, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Semantic type of an assumption value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssumptionKind {
    /// Per-period rate (growth, inflow, yield, spread)
    Rate,
    /// Fraction in [0, 1] that is not a per-period rate
    Percentage,
    /// Currency amount
    Currency,
    /// Whole-number count (users, periods, days)
    Count,
}

impl AssumptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssumptionKind::Rate => "rate",
            AssumptionKind::Percentage => "percentage",
            AssumptionKind::Currency => "currency",
            AssumptionKind::Count => "count",
        }
    }
}

impl fmt::Display for AssumptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssumptionKind {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rate" => Ok(AssumptionKind::Rate),
            "percentage" | "pct" => Ok(AssumptionKind::Percentage),
            "currency" => Ok(AssumptionKind::Currency),
            "count" => Ok(AssumptionKind::Count),
            other => Err(ProjectionError::UnknownKind(other.to_string())),
        }
    }
}

/// A named parameter with a valid range and a default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssumptionSpec {
    pub name: String,
    pub kind: AssumptionKind,
    pub min: f64,
    pub max: f64,
    pub default: f64,
    #[serde(default)]
    pub description: String,
}

impl AssumptionSpec {
    pub fn new(name: &str, kind: AssumptionKind, min: f64, max: f64, default: f64, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            min,
            max,
            default,
            description: description.to_string(),
        }
    }

    /// Check a candidate value against this declaration. Never clamps.
    pub fn check(&self, value: f64) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite {
                name: self.name.clone(),
                value,
            });
        }
        if value < self.min || value > self.max {
            return Err(ValidationError::OutOfRange {
                name: self.name.clone(),
                value,
                min: self.min,
                max: self.max,
            });
        }
        if self.kind == AssumptionKind::Count && value.fract() != 0.0 {
            return Err(ValidationError::NotIntegral {
                name: self.name.clone(),
                value,
            });
        }
        Ok(())
    }
}

/// Registry of every known assumption
#[derive(Debug, Clone, PartialEq)]
pub struct AssumptionRegistry {
    specs: BTreeMap<String, AssumptionSpec>,
}

impl AssumptionRegistry {
    /// Empty registry, populated through [`AssumptionRegistry::register`]
    pub fn empty() -> Self {
        Self { specs: BTreeMap::new() }
    }

    /// Built-in registry for the microlending model
    pub fn standard() -> Self {
        use AssumptionKind::*;

        let specs = [
            AssumptionSpec::new(names::INITIAL_USERS, Count, 0.0, 1e9, 15_400.0, "Active users at the first period"),
            AssumptionSpec::new(names::GROWTH_RATE, Rate, 0.0, 1.0, 0.08, "Undampened per-period user growth"),
            AssumptionSpec::new(names::TAM, Currency, 0.0, 1e13, 506_000_000_000.0, "Total addressable market"),
            AssumptionSpec::new(names::SATURATION, Percentage, 0.0, 1.0, 0.001, "Share of TAM reachable before growth stalls"),
            AssumptionSpec::new(names::AVERAGE_LOAN_SIZE, Currency, 1.0, 10_000.0, 30.0, "Average principal per loan"),
            AssumptionSpec::new(names::REPEAT_BORROW_RATE, Percentage, 0.0, 1.0, 0.0, "Share of existing users borrowing again each period"),
            AssumptionSpec::new(names::LOAN_TERM, Count, 1.0, 120.0, 1.0, "Loan term in periods"),
            AssumptionSpec::new(names::DEFAULT_RATE_BASE, Percentage, 0.0, 1.0, 0.05, "Default rate before fraud reduction"),
            AssumptionSpec::new(names::FRAUD_REDUCTION_FRACTION, Percentage, 0.0, 1.0, 0.99, "Fraction of defaults removed by fraud controls"),
            AssumptionSpec::new(names::RECOVERY_RATE, Percentage, 0.0, 1.0, 0.0, "Fraction of defaulted principal recovered"),
            AssumptionSpec::new(names::INITIAL_CAPITAL, Currency, 0.0, 1e12, 1_200_000.0, "Staker capital at the first period"),
            AssumptionSpec::new(names::CAPITAL_INFLOW_RATE, Rate, 0.0, 1.0, 0.05, "Per-period compounding growth of staker capital"),
            AssumptionSpec::new(names::CAPITAL_WITHDRAWAL_RATE, Rate, 0.0, 1.0, 0.0, "Per-period staker capital withdrawals"),
            AssumptionSpec::new(names::YIELD_RATE, Rate, 0.0, 0.25, 0.0115, "Per-period yield paid on staker capital"),
            AssumptionSpec::new(names::INTEREST_SPREAD, Rate, 0.0, 1.0, 0.1875, "Per-period interest earned on outstanding principal"),
            AssumptionSpec::new(names::FEE_RATE, Percentage, 0.0, 1.0, 0.10, "Origination fee on new principal"),
            AssumptionSpec::new(names::PLATFORM_REVENUE_SHARE, Percentage, 0.0, 1.0, 0.20, "Platform share of per-loan fees"),
            AssumptionSpec::new(names::LOAN_TERM_DAYS, Count, 1.0, 365.0, 30.0, "Loan term in days for APR"),
            AssumptionSpec::new(names::PAYDAY_FEE_PER_100, Currency, 0.0, 100.0, 15.0, "Typical payday lender fee per $100 borrowed"),
        ];

        Self {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Add or replace a declaration. The default must satisfy its own bounds.
    pub fn register(&mut self, spec: AssumptionSpec) -> Result<(), ValidationError> {
        if spec.min > spec.max {
            return Err(ValidationError::OutOfRange {
                name: spec.name.clone(),
                value: spec.default,
                min: spec.min,
                max: spec.max,
            });
        }
        spec.check(spec.default)?;
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn spec(&self, name: &str) -> Option<&AssumptionSpec> {
        self.specs.get(name)
    }

    /// Declarations in name order
    pub fn specs(&self) -> impl Iterator<Item = &AssumptionSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Validate a single named value
    pub fn validate(&self, name: &str, value: f64) -> Result<(), ValidationError> {
        match self.specs.get(name) {
            Some(spec) => spec.check(value),
            None => Err(ValidationError::UnknownAssumption {
                name: name.to_string(),
            }),
        }
    }

    /// Every assumption at its default
    pub fn defaults(&self) -> AssumptionSet {
        AssumptionSet::from_validated(self.specs.values().map(|s| (s.name.clone(), s.default)).collect())
    }

    /// Merge overrides onto the registry defaults.
    ///
    /// Fails on the first invalid override, in the order supplied.
    pub fn build_set<'a, I>(&self, overrides: I) -> Result<AssumptionSet, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let defaults = self.specs.values().map(|s| (s.name.clone(), s.default)).collect();
        self.apply(defaults, overrides)
    }

    /// Layer overrides on top of an existing set (scenario over base)
    pub fn layer<'a, I>(&self, base: &AssumptionSet, overrides: I) -> Result<AssumptionSet, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values: BTreeMap<String, f64> =
            base.iter().map(|(k, v)| (k.to_string(), v)).collect();
        // A base built by an older registry may lack newer declarations
        for spec in self.specs.values() {
            values.entry(spec.name.clone()).or_insert(spec.default);
        }
        self.apply(values, overrides)
    }

    fn apply<'a, I>(&self, mut values: BTreeMap<String, f64>, overrides: I) -> Result<AssumptionSet, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for (name, value) in overrides {
            self.validate(name, value)?;
            values.insert(name.to_string(), value);
        }
        for (name, value) in &values {
            self.validate(name, *value)?;
        }
        Ok(AssumptionSet::from_validated(values))
    }
}

impl Default for AssumptionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
