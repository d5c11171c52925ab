//! Metric series and the projection run bundle

use super::grid::{Period, TimeGrid};
use super::loans::Cohort;
use crate::assumptions::AssumptionSet;
use crate::cache::Fingerprint;
use crate::error::ProjectionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Named metric produced by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    ActiveUsers,
    NewUsers,
    OriginationDemand,
    Originations,
    UnmetDemand,
    Repayments,
    OutstandingBalance,
    Defaults,
    Losses,
    CapitalSupplied,
    Utilization,
    YieldPaid,
    GrossRevenue,
    LossProvision,
    NetRevenue,
    CumulativeNetRevenue,
}

impl Metric {
    /// Every metric, in pipeline order
    pub const ALL: [Metric; 16] = [
        Metric::ActiveUsers,
        Metric::NewUsers,
        Metric::OriginationDemand,
        Metric::Originations,
        Metric::UnmetDemand,
        Metric::Repayments,
        Metric::OutstandingBalance,
        Metric::Defaults,
        Metric::Losses,
        Metric::CapitalSupplied,
        Metric::Utilization,
        Metric::YieldPaid,
        Metric::GrossRevenue,
        Metric::LossProvision,
        Metric::NetRevenue,
        Metric::CumulativeNetRevenue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::ActiveUsers => "active_users",
            Metric::NewUsers => "new_users",
            Metric::OriginationDemand => "origination_demand",
            Metric::Originations => "originations",
            Metric::UnmetDemand => "unmet_demand",
            Metric::Repayments => "repayments",
            Metric::OutstandingBalance => "outstanding_balance",
            Metric::Defaults => "defaults",
            Metric::Losses => "losses",
            Metric::CapitalSupplied => "capital_supplied",
            Metric::Utilization => "utilization",
            Metric::YieldPaid => "yield_paid",
            Metric::GrossRevenue => "gross_revenue",
            Metric::LossProvision => "loss_provision",
            Metric::NetRevenue => "net_revenue",
            Metric::CumulativeNetRevenue => "cumulative_net_revenue",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == key)
            .ok_or_else(|| ProjectionError::UnknownMetric(key.to_string()))
    }
}

/// One (period, value) observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: Period,
    pub value: f64,
}

/// Ordered values of one metric, one per grid period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub metric: Metric,
    points: Vec<SeriesPoint>,
}

impl MetricSeries {
    /// Pair per-period values with the grid. `values` must have one entry per period.
    pub fn from_values(metric: Metric, grid: &TimeGrid, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), grid.len(), "{} has a gap", metric);
        let points = grid
            .periods()
            .zip(values)
            .map(|(period, value)| SeriesPoint { period, value })
            .collect();
        Self { metric, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        self.points.get(index).map(|p| p.value)
    }

    /// Values in period order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Value at the final period
    pub fn last(&self) -> f64 {
        self.points.last().map(|p| p.value).unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }

    pub fn max(&self) -> f64 {
        self.points.iter().map(|p| p.value).reduce(f64::max).unwrap_or(0.0)
    }
}

/// Non-fatal condition recovered locally and attached to the affected period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    /// Demand exceeded available capital; originations were capped
    CapacityShortfall {
        period: u32,
        demand: f64,
        capital: f64,
        unmet: f64,
    },
    /// A value was clamped to zero to keep it non-negative
    NumericInstability {
        period: u32,
        metric: Metric,
        raw_value: f64,
    },
}

impl Annotation {
    pub fn period(&self) -> u32 {
        match self {
            Annotation::CapacityShortfall { period, .. } | Annotation::NumericInstability { period, .. } => *period,
        }
    }
}

/// Full bundle of metric series for one resolved assumption set over one grid
///
/// Immutable once produced; shared between the comparator and the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRun {
    pub fingerprint: Fingerprint,
    pub assumptions: AssumptionSet,
    pub grid: TimeGrid,
    series: BTreeMap<Metric, MetricSeries>,
    pub cohorts: Vec<Cohort>,
    pub annotations: Vec<Annotation>,
}

impl ProjectionRun {
    pub fn new(
        assumptions: AssumptionSet,
        grid: TimeGrid,
        series: Vec<MetricSeries>,
        cohorts: Vec<Cohort>,
        mut annotations: Vec<Annotation>,
    ) -> Self {
        annotations.sort_by_key(|a| a.period());
        Self {
            fingerprint: Fingerprint::of(&assumptions, &grid),
            assumptions,
            grid,
            series: series.into_iter().map(|s| (s.metric, s)).collect(),
            cohorts,
            annotations,
        }
    }

    pub fn series(&self, metric: Metric) -> Option<&MetricSeries> {
        self.series.get(&metric)
    }

    /// Look up a series by its metric name
    pub fn series_named(&self, name: &str) -> Result<&MetricSeries, ProjectionError> {
        let metric: Metric = name.parse()?;
        self.series(metric)
            .ok_or_else(|| ProjectionError::UnknownMetric(name.to_string()))
    }

    /// Every series, keyed by metric
    pub fn all_series(&self) -> impl Iterator<Item = (&Metric, &MetricSeries)> {
        self.series.iter()
    }

    pub fn value(&self, metric: Metric, index: usize) -> Option<f64> {
        self.series(metric).and_then(|s| s.value(index))
    }

    /// Value of a metric at the final period of the grid
    pub fn horizon_value(&self, metric: Metric) -> Option<f64> {
        self.series(metric).map(MetricSeries::last)
    }

    pub fn annotations_for(&self, period: u32) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter().filter(move |a| a.period() == period)
    }

    /// Get summary statistics
    pub fn summary(&self) -> RunSummary {
        let total = |m: Metric| self.series(m).map(MetricSeries::total).unwrap_or(0.0);
        let last = |m: Metric| self.horizon_value(m).unwrap_or(0.0);

        RunSummary {
            periods: self.grid.len() as u32,
            final_active_users: last(Metric::ActiveUsers),
            total_originations: total(Metric::Originations),
            total_unmet_demand: total(Metric::UnmetDemand),
            total_losses: total(Metric::Losses),
            total_yield_paid: total(Metric::YieldPaid),
            total_gross_revenue: total(Metric::GrossRevenue),
            final_outstanding: last(Metric::OutstandingBalance),
            final_capital: last(Metric::CapitalSupplied),
            cumulative_net_revenue: last(Metric::CumulativeNetRevenue),
            shortfall_periods: self
                .annotations
                .iter()
                .filter(|a| matches!(a, Annotation::CapacityShortfall { .. }))
                .count() as u32,
            clamped_values: self
                .annotations
                .iter()
                .filter(|a| matches!(a, Annotation::NumericInstability { .. }))
                .count() as u32,
        }
    }
}

/// Summary statistics for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub periods: u32,
    pub final_active_users: f64,
    pub total_originations: f64,
    pub total_unmet_demand: f64,
    pub total_losses: f64,
    pub total_yield_paid: f64,
    pub total_gross_revenue: f64,
    pub final_outstanding: f64,
    pub final_capital: f64,
    pub cumulative_net_revenue: f64,
    pub shortfall_periods: u32,
    pub clamped_values: u32,
}
