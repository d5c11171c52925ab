//! Staker capital supply, utilization against loan demand, and yield payouts

use super::grid::TimeGrid;
use super::series::{Annotation, Metric, MetricSeries};
use crate::assumptions::{names, AssumptionSet};
use crate::error::Result;

/// Capital inputs resolved from an assumption set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapitalParams {
    pub initial_capital: f64,
    pub inflow_rate: f64,
    pub withdrawal_rate: f64,
    pub yield_rate: f64,
}

impl CapitalParams {
    pub fn from_set(set: &AssumptionSet) -> Result<Self> {
        Ok(Self {
            initial_capital: set.required(names::INITIAL_CAPITAL)?,
            inflow_rate: set.required(names::CAPITAL_INFLOW_RATE)?,
            withdrawal_rate: set.required(names::CAPITAL_WITHDRAWAL_RATE)?,
            yield_rate: set.required(names::YIELD_RATE)?,
        })
    }

    /// Capital available in each period, compounding by net inflow
    pub fn supply(&self, periods: usize) -> Vec<f64> {
        let growth = (1.0 + self.inflow_rate - self.withdrawal_rate).max(0.0);
        let mut capital = self.initial_capital;
        let mut supply = Vec::with_capacity(periods);

        for t in 0..periods {
            if t > 0 {
                capital *= growth;
            }
            supply.push(capital);
        }

        supply
    }
}

/// Capital-constrained view of loan demand
#[derive(Debug, Clone, PartialEq)]
pub struct CapitalAllocation {
    pub capital_supplied: MetricSeries,
    /// Originations actually funded (demand capped at capital)
    pub originations: MetricSeries,
    pub unmet_demand: MetricSeries,
    pub utilization: MetricSeries,
    pub yield_paid: MetricSeries,
    pub annotations: Vec<Annotation>,
}

/// Fund requested originations from staker capital.
///
/// Capital is a hard constraint: demand above available capital is capped and
/// the excess recorded as unmet demand for that period, not raised as an error.
///
/// Utilization is funded / available capital. Demand exactly equal to capital
/// reports utilization 1.0 with zero unmet demand and no shortfall annotation;
/// unmet demand is positive only when demand strictly exceeds capital. With no
/// capital, utilization is 1.0 if anything was requested and 0.0 otherwise.
pub fn allocate_capital(originations: &MetricSeries, set: &AssumptionSet, grid: &TimeGrid) -> Result<CapitalAllocation> {
    let params = CapitalParams::from_set(set)?;
    let supply = params.supply(grid.len());

    let mut funded = Vec::with_capacity(supply.len());
    let mut unmet = Vec::with_capacity(supply.len());
    let mut utilization = Vec::with_capacity(supply.len());
    let mut yield_paid = Vec::with_capacity(supply.len());
    let mut annotations = Vec::new();

    for (t, &capital) in supply.iter().enumerate() {
        let demand = originations.value(t).unwrap_or(0.0).max(0.0);
        let granted = demand.min(capital);
        let shortfall = demand - granted;

        let used = if capital > 0.0 {
            (granted / capital).min(1.0)
        } else if demand > 0.0 {
            1.0
        } else {
            0.0
        };

        if shortfall > 0.0 {
            log::debug!(
                "Capacity shortfall at period {}: demand {:.2}, capital {:.2}, unmet {:.2}",
                t,
                demand,
                capital,
                shortfall
            );
            annotations.push(Annotation::CapacityShortfall {
                period: t as u32,
                demand,
                capital,
                unmet: shortfall,
            });
        }

        funded.push(granted);
        unmet.push(shortfall);
        utilization.push(used);
        yield_paid.push(capital * params.yield_rate);
    }

    if !annotations.is_empty() {
        log::warn!(
            "Capital constrained originations in {} of {} periods",
            annotations.len(),
            supply.len()
        );
    }

    Ok(CapitalAllocation {
        capital_supplied: MetricSeries::from_values(Metric::CapitalSupplied, grid, supply),
        originations: MetricSeries::from_values(Metric::Originations, grid, funded),
        unmet_demand: MetricSeries::from_values(Metric::UnmetDemand, grid, unmet),
        utilization: MetricSeries::from_values(Metric::Utilization, grid, utilization),
        yield_paid: MetricSeries::from_values(Metric::YieldPaid, grid, yield_paid),
        annotations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::AssumptionRegistry;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn grid(periods: u32) -> TimeGrid {
        TimeGrid::monthly(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), periods).unwrap()
    }

    fn set(overrides: &[(&str, f64)]) -> AssumptionSet {
        AssumptionRegistry::standard()
            .build_set(overrides.iter().copied())
            .unwrap()
    }

    fn demand(g: &TimeGrid, values: Vec<f64>) -> MetricSeries {
        MetricSeries::from_values(Metric::OriginationDemand, g, values)
    }

    #[test]
    fn test_capital_compounds_and_never_shrinks() {
        let g = grid(36);
        let alloc = allocate_capital(&demand(&g, vec![0.0; 36]), &set(&[]), &g).unwrap();
        let capital = alloc.capital_supplied.values();

        for window in capital.windows(2) {
            assert!(window[1] >= window[0]);
        }
        assert_relative_eq!(capital[12], 1_200_000.0 * 1.05f64.powi(12), max_relative = 1e-12);
    }

    #[test]
    fn test_withdrawals_can_shrink_capital() {
        let g = grid(6);
        let s = set(&[(names::CAPITAL_INFLOW_RATE, 0.01), (names::CAPITAL_WITHDRAWAL_RATE, 0.03)]);
        let capital = allocate_capital(&demand(&g, vec![0.0; 6]), &s, &g).unwrap().capital_supplied.values();
        assert!(capital[5] < capital[0]);
    }

    #[test]
    fn test_capacity_cap_records_unmet_demand() {
        let g = grid(3);
        let s = set(&[(names::INITIAL_CAPITAL, 1_000.0), (names::CAPITAL_INFLOW_RATE, 0.0)]);
        let alloc = allocate_capital(&demand(&g, vec![400.0, 1_000.0, 1_500.0]), &s, &g).unwrap();

        assert_eq!(alloc.originations.values(), vec![400.0, 1_000.0, 1_000.0]);
        assert_eq!(alloc.unmet_demand.values(), vec![0.0, 0.0, 500.0]);
        assert_eq!(alloc.utilization.values(), vec![0.4, 1.0, 1.0]);
        assert_eq!(
            alloc.annotations,
            vec![Annotation::CapacityShortfall {
                period: 2,
                demand: 1_500.0,
                capital: 1_000.0,
                unmet: 500.0,
            }]
        );
    }

    #[test]
    fn test_exact_capacity_has_no_shortfall() {
        let g = grid(2);
        let s = set(&[(names::INITIAL_CAPITAL, 1_000.0), (names::CAPITAL_INFLOW_RATE, 0.0)]);
        let alloc = allocate_capital(&demand(&g, vec![1_000.0, 1_000.5]), &s, &g).unwrap();

        assert_eq!(alloc.utilization.values(), vec![1.0, 1.0]);
        assert_eq!(alloc.unmet_demand.values(), vec![0.0, 0.5]);
        assert_eq!(alloc.annotations.len(), 1);
        assert_eq!(alloc.annotations[0].period(), 1);
    }

    #[test]
    fn test_utilization_bounds() {
        let g = grid(24);
        let s = set(&[(names::INITIAL_CAPITAL, 10_000.0)]);
        let values: Vec<f64> = (0..24).map(|t| 2_000.0 * t as f64).collect();
        let alloc = allocate_capital(&demand(&g, values), &s, &g).unwrap();

        for t in 0..24 {
            let u = alloc.utilization.value(t).unwrap();
            assert!((0.0..=1.0).contains(&u));
            assert!(alloc.originations.value(t).unwrap() <= alloc.capital_supplied.value(t).unwrap());
        }
        assert!(alloc.unmet_demand.total() > 0.0);
    }

    #[test]
    fn test_zero_capital_is_fully_constrained() {
        let g = grid(2);
        let s = set(&[(names::INITIAL_CAPITAL, 0.0)]);
        let alloc = allocate_capital(&demand(&g, vec![100.0, 0.0]), &s, &g).unwrap();

        assert_eq!(alloc.originations.values(), vec![0.0, 0.0]);
        assert_eq!(alloc.unmet_demand.values(), vec![100.0, 0.0]);
        assert_eq!(alloc.utilization.values(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_yield_tracks_capital_base() {
        let g = grid(12);
        let s = set(&[(names::YIELD_RATE, 0.02)]);
        let alloc = allocate_capital(&demand(&g, vec![0.0; 12]), &s, &g).unwrap();

        for t in 0..12 {
            assert_relative_eq!(
                alloc.yield_paid.value(t).unwrap(),
                alloc.capital_supplied.value(t).unwrap() * 0.02
            );
        }
        // Growing base means growing payouts
        assert!(alloc.yield_paid.last() > alloc.yield_paid.value(0).unwrap());
    }
}
