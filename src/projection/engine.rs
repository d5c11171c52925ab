//! Core projection engine: runs the full pipeline for one assumption set over one grid
//!
//! Stages run strictly downstream:
//! growth → origination demand → capital allocation → loan book → revenue.
//! Capital is allocated before the loan book so the book only carries funded loans.

use super::capital::allocate_capital;
use super::grid::TimeGrid;
use super::growth::{new_users, project_growth};
use super::loans::{book_from_originations, origination_demand};
use super::revenue::aggregate_financials;
use super::series::ProjectionRun;
use crate::assumptions::AssumptionSet;
use crate::error::Result;

/// Main projection engine
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    assumptions: AssumptionSet,
    grid: TimeGrid,
}

impl ProjectionEngine {
    /// Create an engine for a resolved assumption set and grid
    pub fn new(assumptions: AssumptionSet, grid: TimeGrid) -> Self {
        Self { assumptions, grid }
    }

    pub fn assumptions(&self) -> &AssumptionSet {
        &self.assumptions
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Run every stage and bundle the resulting series
    pub fn run(&self) -> Result<ProjectionRun> {
        let set = &self.assumptions;
        let grid = &self.grid;

        log::debug!(
            "Projecting {} {} periods from {}",
            grid.len(),
            grid.cadence(),
            grid.start()
        );

        let active_users = project_growth(set, grid)?;
        let joined = new_users(&active_users, grid);
        let demand = origination_demand(&active_users, set, grid)?;
        let capital = allocate_capital(&demand, set, grid)?;
        let book = book_from_originations(&capital.originations, set, grid)?;
        let financials = aggregate_financials(&book, &capital, set, grid)?;

        let mut annotations = capital.annotations;
        annotations.extend(book.annotations);

        let series = vec![
            active_users,
            joined,
            demand,
            book.originations,
            capital.unmet_demand,
            book.repayments,
            book.outstanding_balance,
            book.defaults,
            book.losses,
            capital.capital_supplied,
            capital.utilization,
            capital.yield_paid,
            financials.gross_revenue,
            financials.loss_provision,
            financials.net_revenue,
            financials.cumulative_net_revenue,
        ];

        let run = ProjectionRun::new(set.clone(), grid.clone(), series, book.cohorts, annotations);
        log::debug!(
            "Projection {} complete: {} annotations",
            run.fingerprint,
            run.annotations.len()
        );
        Ok(run)
    }
}

/// Run the pipeline once without constructing an engine
pub fn project(set: &AssumptionSet, grid: &TimeGrid) -> Result<ProjectionRun> {
    ProjectionEngine::new(set.clone(), grid.clone()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::{names, AssumptionRegistry};
    use crate::projection::series::{Annotation, Metric};
    use chrono::NaiveDate;

    fn grid(periods: u32) -> TimeGrid {
        TimeGrid::monthly(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), periods).unwrap()
    }

    fn set(overrides: &[(&str, f64)]) -> AssumptionSet {
        AssumptionRegistry::standard()
            .build_set(overrides.iter().copied())
            .unwrap()
    }

    fn launch_case() -> AssumptionSet {
        set(&[
            (names::GROWTH_RATE, 0.08),
            (names::TAM, 506_000_000_000.0),
            (names::FRAUD_REDUCTION_FRACTION, 0.99),
            (names::DEFAULT_RATE_BASE, 0.05),
            (names::YIELD_RATE, 0.138),
        ])
    }

    #[test]
    fn test_projection_runs() {
        let run = project(&set(&[]), &grid(12)).unwrap();

        assert_eq!(run.grid.len(), 12);
        for metric in Metric::ALL {
            assert_eq!(run.series(metric).unwrap().len(), 12, "{}", metric);
        }
        assert_eq!(run.cohorts.len(), 12);
    }

    #[test]
    fn test_launch_case_golden() {
        let run = project(&launch_case(), &grid(12)).unwrap();

        let users = run.series(Metric::ActiveUsers).unwrap();
        assert!(users.value(11).unwrap() > users.value(0).unwrap());

        let net = run.value(Metric::NetRevenue, 11).unwrap();
        let pinned = -260_395.892_808_460_25_f64;
        assert_eq!(net.to_bits(), pinned.to_bits(), "net_revenue[11] = {:?}, pinned {:?}", net, pinned);

        // Same inputs, same bits
        let again = project(&launch_case(), &grid(12)).unwrap();
        assert_eq!(again.value(Metric::NetRevenue, 11).unwrap().to_bits(), net.to_bits());
        assert_eq!(again, run);
    }

    #[test]
    fn test_launch_case_losses_bounded_by_base_rate() {
        let run = project(&launch_case(), &grid(12)).unwrap();
        let losses = run.series(Metric::Losses).unwrap().values();
        let outstanding = run.series(Metric::OutstandingBalance).unwrap().values();

        for t in 0..12 {
            assert!(losses[t] <= 0.05 * outstanding[t], "period {}", t);
        }
    }

    #[test]
    fn test_outstanding_never_negative() {
        let s = set(&[(names::LOAN_TERM, 7.0), (names::FRAUD_REDUCTION_FRACTION, 0.0)]);
        let run = project(&s, &grid(48)).unwrap();
        assert!(run
            .series(Metric::OutstandingBalance)
            .unwrap()
            .values()
            .iter()
            .all(|&v| v >= 0.0));
    }

    #[test]
    fn test_capacity_shortfall_annotated() {
        let s = set(&[(names::INITIAL_CAPITAL, 10_000.0), (names::CAPITAL_INFLOW_RATE, 0.0)]);
        let run = project(&s, &grid(12)).unwrap();

        let unmet = run.series(Metric::UnmetDemand).unwrap();
        assert!(unmet.total() > 0.0);

        for t in 0..12 {
            let utilization = run.value(Metric::Utilization, t).unwrap();
            let funded = run.value(Metric::Originations, t).unwrap();
            let capital = run.value(Metric::CapitalSupplied, t).unwrap();
            assert!((0.0..=1.0).contains(&utilization));
            assert!(funded <= capital);
            if unmet.value(t).unwrap() > 0.0 {
                assert_eq!(utilization, 1.0);
                assert!(run
                    .annotations_for(t as u32)
                    .any(|a| matches!(a, Annotation::CapacityShortfall { .. })));
            }
        }
        assert!(run.summary().shortfall_periods > 0);
    }

    #[test]
    fn test_cumulative_net_revenue_is_running_sum() {
        let run = project(&set(&[(names::LOAN_TERM, 3.0)]), &grid(60)).unwrap();
        let net = run.series(Metric::NetRevenue).unwrap().values();
        let cumulative = run.series(Metric::CumulativeNetRevenue).unwrap().values();

        assert_eq!(cumulative[0], net[0]);
        for t in 1..60 {
            assert_eq!(cumulative[t], cumulative[t - 1] + net[t]);
        }
    }

    #[test]
    fn test_fraud_reduction_monotone_over_pipeline() {
        let g = grid(24);
        let mut previous = f64::INFINITY;
        for fraud in [0.0, 0.3, 0.6, 0.9, 0.99] {
            let run = project(&set(&[(names::FRAUD_REDUCTION_FRACTION, fraud)]), &g).unwrap();
            let total = run.series(Metric::Losses).unwrap().total();
            assert!(total <= previous);
            previous = total;
        }
    }
}
