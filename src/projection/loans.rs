//! Loan book: cohort origination, runoff, defaults and losses
//!
//! Each period's originations form one cohort. A cohort of principal P and
//! term n runs off P/n in each of the n periods after its origination period;
//! the applied default rate decides how much of each runoff defaults rather
//! than being repaid. Cohorts live in an arena indexed by origination period
//! and are addressed by (origination_period, age).

use super::grid::TimeGrid;
use super::series::{Annotation, Metric, MetricSeries};
use crate::assumptions::{names, AssumptionSet};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Loans originated within one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub origination_period: u32,
    pub principal: f64,
    /// Lifetime default rate after fraud reduction
    pub default_rate: f64,
    /// Term in periods
    pub term: u32,
    /// Running outstanding principal
    pub outstanding: f64,
    pub cumulative_defaults: f64,
    pub cumulative_losses: f64,
}

/// Principal leaving a cohort in one period
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Runoff {
    pub repaid: f64,
    pub defaulted: f64,
    pub lost: f64,
}

impl Cohort {
    fn new(origination_period: u32, principal: f64, default_rate: f64, term: u32) -> Self {
        Self {
            origination_period,
            principal,
            default_rate,
            term,
            outstanding: principal,
            cumulative_defaults: 0.0,
            cumulative_losses: 0.0,
        }
    }

    /// Periods elapsed since origination, if `period` is not before it
    pub fn age_at(&self, period: u32) -> Option<u32> {
        period.checked_sub(self.origination_period)
    }

    /// Period in which the last of the principal runs off
    pub fn maturity_period(&self) -> u32 {
        self.origination_period + self.term
    }

    /// Carries a balance at the end of `period`
    pub fn is_outstanding_at(&self, period: u32) -> bool {
        matches!(self.age_at(period), Some(age) if age < self.term)
    }

    /// Run off one slice of principal at `age` (1..=term).
    /// The final slice clears whatever balance remains.
    fn run_off(&mut self, age: u32, recovery_rate: f64) -> Runoff {
        let slice = if age >= self.term {
            self.outstanding
        } else {
            (self.principal / self.term as f64).min(self.outstanding)
        };

        let defaulted = slice * self.default_rate;
        let lost = defaulted * (1.0 - recovery_rate);

        self.outstanding = if age >= self.term { 0.0 } else { self.outstanding - slice };
        self.cumulative_defaults += defaulted;
        self.cumulative_losses += lost;

        Runoff {
            repaid: slice - defaulted,
            defaulted,
            lost,
        }
    }
}

/// Append-only cohort storage; index equals origination period
#[derive(Debug, Clone, Default)]
pub struct CohortArena {
    cohorts: Vec<Cohort>,
    max_term: u32,
}

impl CohortArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the cohort for the next origination period
    pub fn originate(&mut self, principal: f64, default_rate: f64, term: u32) -> &Cohort {
        let period = self.cohorts.len() as u32;
        self.max_term = self.max_term.max(term);
        self.cohorts.push(Cohort::new(period, principal, default_rate, term));
        &self.cohorts[period as usize]
    }

    pub fn get(&self, origination_period: u32) -> Option<&Cohort> {
        self.cohorts.get(origination_period as usize)
    }

    /// Cohort originated at `origination_period`, if it is still within its term at `age`
    pub fn at(&self, origination_period: u32, age: u32) -> Option<&Cohort> {
        self.get(origination_period).filter(|c| age <= c.term)
    }

    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    /// Sum of running balances across all cohorts
    pub fn outstanding(&self) -> f64 {
        self.cohorts.iter().map(|c| c.outstanding).sum()
    }

    /// Cohorts with a runoff slice due in `period`, with their age
    fn running_off_mut(&mut self, period: u32) -> impl Iterator<Item = (u32, &mut Cohort)> {
        let hi = (period as usize).min(self.cohorts.len());
        let lo = (period.saturating_sub(self.max_term) as usize).min(hi);
        self.cohorts[lo..hi].iter_mut().filter_map(move |cohort| {
            let age = period - cohort.origination_period;
            (age >= 1 && age <= cohort.term).then_some((age, cohort))
        })
    }

    pub fn into_vec(self) -> Vec<Cohort> {
        self.cohorts
    }
}

/// Loan inputs resolved from an assumption set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoanParams {
    pub average_loan_size: f64,
    pub repeat_borrow_rate: f64,
    pub term: u32,
    pub default_rate_base: f64,
    pub fraud_reduction: f64,
    pub recovery_rate: f64,
}

impl LoanParams {
    pub fn from_set(set: &AssumptionSet) -> Result<Self> {
        Ok(Self {
            average_loan_size: set.required(names::AVERAGE_LOAN_SIZE)?,
            repeat_borrow_rate: set.required(names::REPEAT_BORROW_RATE)?,
            term: set.required_count(names::LOAN_TERM)?.max(1),
            default_rate_base: set.required(names::DEFAULT_RATE_BASE)?,
            fraud_reduction: set.required(names::FRAUD_REDUCTION_FRACTION)?,
            recovery_rate: set.required(names::RECOVERY_RATE)?,
        })
    }

    /// Default rate applied to cohorts: base × (1 − fraud reduction)
    pub fn effective_default_rate(&self) -> f64 {
        self.default_rate_base * (1.0 - self.fraud_reduction)
    }
}

/// Aligned loan-book series plus the cohorts behind them
#[derive(Debug, Clone, PartialEq)]
pub struct LoanBook {
    pub originations: MetricSeries,
    pub repayments: MetricSeries,
    pub outstanding_balance: MetricSeries,
    pub defaults: MetricSeries,
    pub losses: MetricSeries,
    pub cohorts: Vec<Cohort>,
    pub annotations: Vec<Annotation>,
}

/// Principal requested per period: new users plus repeat borrowers,
/// each taking one average-sized loan
pub fn origination_demand(active_users: &MetricSeries, set: &AssumptionSet, grid: &TimeGrid) -> Result<MetricSeries> {
    let params = LoanParams::from_set(set)?;
    let users = active_users.values();

    let values = users
        .iter()
        .enumerate()
        .map(|(t, &u)| {
            let prior = if t == 0 { 0.0 } else { users[t - 1] };
            let new = (u - prior).max(0.0);
            (new + params.repeat_borrow_rate * prior) * params.average_loan_size
        })
        .collect();

    Ok(MetricSeries::from_values(Metric::OriginationDemand, grid, values))
}

/// Simulate the book with every unit of demand funded
pub fn simulate_loans(active_users: &MetricSeries, set: &AssumptionSet, grid: &TimeGrid) -> Result<LoanBook> {
    let demand = origination_demand(active_users, set, grid)?;
    book_from_originations(&demand, set, grid)
}

/// Simulate the book from a given origination series (typically capital-capped)
pub fn book_from_originations(originations: &MetricSeries, set: &AssumptionSet, grid: &TimeGrid) -> Result<LoanBook> {
    let params = LoanParams::from_set(set)?;
    let default_rate = params.effective_default_rate();
    let periods = grid.len();

    let mut arena = CohortArena::new();
    let mut annotations = Vec::new();
    let mut originated = Vec::with_capacity(periods);
    let mut repayments = Vec::with_capacity(periods);
    let mut outstanding = Vec::with_capacity(periods);
    let mut defaults = Vec::with_capacity(periods);
    let mut losses = Vec::with_capacity(periods);
    let mut prior_balance = 0.0;

    for t in 0..periods {
        let period = t as u32;
        let new_principal = originations.value(t).unwrap_or(0.0);

        let mut runoff = Runoff::default();
        for (age, cohort) in arena.running_off_mut(period) {
            let slice = cohort.run_off(age, params.recovery_rate);
            runoff.repaid += slice.repaid;
            runoff.defaulted += slice.defaulted;
            runoff.lost += slice.lost;
        }
        arena.originate(new_principal, default_rate, params.term);

        let raw = prior_balance + new_principal - runoff.repaid - runoff.defaulted;
        let balance = clamp_non_negative(raw, period, Metric::OutstandingBalance, &mut annotations);

        originated.push(new_principal);
        repayments.push(runoff.repaid);
        outstanding.push(balance);
        defaults.push(runoff.defaulted);
        losses.push(runoff.lost);
        prior_balance = balance;
    }

    log::debug!(
        "Loan book: {} cohorts, default rate {:.6} (base {:.4}, fraud reduction {:.4})",
        arena.len(),
        default_rate,
        params.default_rate_base,
        params.fraud_reduction
    );

    Ok(LoanBook {
        originations: MetricSeries::from_values(Metric::Originations, grid, originated),
        repayments: MetricSeries::from_values(Metric::Repayments, grid, repayments),
        outstanding_balance: MetricSeries::from_values(Metric::OutstandingBalance, grid, outstanding),
        defaults: MetricSeries::from_values(Metric::Defaults, grid, defaults),
        losses: MetricSeries::from_values(Metric::Losses, grid, losses),
        cohorts: arena.into_vec(),
        annotations,
    })
}

/// Clamp a rounding-induced negative to zero and record it
pub(crate) fn clamp_non_negative(value: f64, period: u32, metric: Metric, annotations: &mut Vec<Annotation>) -> f64 {
    if value >= 0.0 {
        return value;
    }
    log::warn!("{} clamped to zero at period {} (raw {:e})", metric, period, value);
    annotations.push(Annotation::NumericInstability {
        period,
        metric,
        raw_value: value,
    });
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::AssumptionRegistry;
    use chrono::NaiveDate;

    fn grid(periods: u32) -> TimeGrid {
        TimeGrid::monthly(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), periods).unwrap()
    }

    fn set(overrides: &[(&str, f64)]) -> AssumptionSet {
        AssumptionRegistry::standard()
            .build_set(overrides.iter().copied())
            .unwrap()
    }

    fn originations(g: &TimeGrid, values: Vec<f64>) -> MetricSeries {
        MetricSeries::from_values(Metric::Originations, g, values)
    }

    #[test]
    fn test_single_period_term() {
        let g = grid(4);
        let s = set(&[(names::DEFAULT_RATE_BASE, 0.10), (names::FRAUD_REDUCTION_FRACTION, 0.5)]);
        let book = book_from_originations(&originations(&g, vec![1000.0, 2000.0, 500.0, 0.0]), &s, &g).unwrap();

        // A one-period loan is on the book at the end of its origination period
        assert_eq!(book.outstanding_balance.values(), vec![1000.0, 2000.0, 500.0, 0.0]);
        // and defaults at 10% * (1 - 0.5) when it runs off the next period
        let defaults = book.defaults.values();
        assert_eq!(defaults[0], 0.0);
        assert!((defaults[1] - 50.0).abs() < 1e-9);
        assert!((defaults[2] - 100.0).abs() < 1e-9);
        assert!((defaults[3] - 25.0).abs() < 1e-9);
        assert!((book.repayments.value(1).unwrap() - 950.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_identity_multi_period_term() {
        let g = grid(12);
        let s = set(&[(names::LOAN_TERM, 3.0), (names::FRAUD_REDUCTION_FRACTION, 0.0)]);
        let orig = vec![900.0, 300.0, 0.0, 1200.0, 50.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let book = book_from_originations(&originations(&g, orig.clone()), &s, &g).unwrap();

        let out = book.outstanding_balance.values();
        let repaid = book.repayments.values();
        let defaulted = book.defaults.values();
        for t in 0..12 {
            let prior = if t == 0 { 0.0 } else { out[t - 1] };
            let expected = (prior + orig[t] - repaid[t] - defaulted[t]).max(0.0);
            assert!((out[t] - expected).abs() < 1e-9, "period {}", t);
            assert!(out[t] >= 0.0);
        }

        // 900 runs off 300 per period in periods 1..=3
        assert!((out[0] - 900.0).abs() < 1e-9);
        assert!((out[1] - (600.0 + 300.0)).abs() < 1e-9);
        // Everything matured by period 7
        assert!(out[7].abs() < 1e-9);
        assert!(book.cohorts.iter().all(|c| c.outstanding == 0.0));
    }

    #[test]
    fn test_cohort_totals_match_book() {
        let g = grid(10);
        let s = set(&[(names::LOAN_TERM, 4.0), (names::RECOVERY_RATE, 0.25), (names::FRAUD_REDUCTION_FRACTION, 0.2)]);
        let orig: Vec<f64> = (0..10).map(|t| 100.0 * (t + 1) as f64).collect();
        let book = book_from_originations(&originations(&g, orig), &s, &g).unwrap();

        let cohort_losses: f64 = book.cohorts.iter().map(|c| c.cumulative_losses).sum();
        assert!((cohort_losses - book.losses.total()).abs() < 1e-9);

        let cohort_balance: f64 = book.cohorts.iter().map(|c| c.outstanding).sum();
        assert!((cohort_balance - book.outstanding_balance.last()).abs() < 1e-9);

        // Recovery reduces losses but not defaults
        assert!((book.losses.total() - 0.75 * book.defaults.total()).abs() < 1e-9);
    }

    #[test]
    fn test_fraud_reduction_never_increases_losses() {
        let g = grid(24);
        let orig = originations(&g, (0..24).map(|t| 1_000.0 + 50.0 * t as f64).collect());

        let mut previous = f64::INFINITY;
        for fraud in [0.0, 0.25, 0.5, 0.9, 0.99, 1.0] {
            let s = set(&[(names::FRAUD_REDUCTION_FRACTION, fraud), (names::LOAN_TERM, 2.0)]);
            let total = book_from_originations(&orig, &s, &g).unwrap().losses.total();
            assert!(total <= previous, "fraud {} raised losses", fraud);
            previous = total;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn test_simulate_loans_from_users() {
        let g = grid(3);
        let users = MetricSeries::from_values(Metric::ActiveUsers, &g, vec![100.0, 120.0, 120.0]);
        let s = set(&[(names::REPEAT_BORROW_RATE, 0.5)]);

        let demand = origination_demand(&users, &s, &g).unwrap();
        // (new + 0.5 * prior) * $30
        assert_eq!(demand.values(), vec![3_000.0, (20.0 + 50.0) * 30.0, 60.0 * 30.0]);

        let book = simulate_loans(&users, &s, &g).unwrap();
        assert_eq!(book.originations.values(), demand.values());
    }

    #[test]
    fn test_arena_addressing() {
        let mut arena = CohortArena::new();
        arena.originate(100.0, 0.01, 3);
        arena.originate(0.0, 0.01, 3);
        arena.originate(250.0, 0.01, 3);

        assert_eq!(arena.len(), 3);
        assert_eq!(arena.get(2).unwrap().principal, 250.0);
        assert!(arena.at(0, 3).is_some());
        assert!(arena.at(0, 4).is_none());

        let cohort = arena.get(0).unwrap();
        assert_eq!(cohort.maturity_period(), 3);
        assert!(cohort.is_outstanding_at(2));
        assert!(!cohort.is_outstanding_at(3));
        assert_eq!(arena.outstanding(), 350.0);
    }

    #[test]
    fn test_clamp_records_annotation() {
        let mut annotations = Vec::new();
        assert_eq!(clamp_non_negative(5.0, 1, Metric::OutstandingBalance, &mut annotations), 5.0);
        assert!(annotations.is_empty());

        assert_eq!(clamp_non_negative(-1e-12, 4, Metric::OutstandingBalance, &mut annotations), 0.0);
        assert_eq!(
            annotations,
            vec![Annotation::NumericInstability {
                period: 4,
                metric: Metric::OutstandingBalance,
                raw_value: -1e-12,
            }]
        );
    }
}
