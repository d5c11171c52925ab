//! Unit and investment economics derived from assumptions and finished runs
//!
//! Per-loan fees and APR, a payday-lender comparison, staker returns, an annual
//! roll-up of a run and headline investment metrics.

use crate::assumptions::{names, AssumptionSet};
use crate::error::Result;
use crate::projection::{Metric, MetricSeries, ProjectionRun};
use serde::{Deserialize, Serialize};

const DAYS_PER_YEAR: f64 = 365.0;

/// Fees and returns on one average-sized loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanEconomics {
    pub loan_size: f64,
    /// Interest spread earned over the full term
    pub interest_fee: f64,
    pub origination_fee: f64,
    pub total_fee: f64,
    pub platform_revenue: f64,
    pub staker_revenue: f64,
    /// Annualised cost to the borrower
    pub apr: f64,
}

impl LoanEconomics {
    pub fn from_set(set: &AssumptionSet) -> Result<Self> {
        let loan_size = set.required(names::AVERAGE_LOAN_SIZE)?;
        let term = set.required_count(names::LOAN_TERM)?.max(1) as f64;
        let term_days = set.required_count(names::LOAN_TERM_DAYS)?.max(1) as f64;
        let share = set.required(names::PLATFORM_REVENUE_SHARE)?;

        let interest_fee = loan_size * set.required(names::INTEREST_SPREAD)? * term;
        let origination_fee = loan_size * set.required(names::FEE_RATE)?;
        let total_fee = interest_fee + origination_fee;

        Ok(Self {
            loan_size,
            interest_fee,
            origination_fee,
            total_fee,
            platform_revenue: total_fee * share,
            staker_revenue: total_fee * (1.0 - share),
            apr: annualise(total_fee, loan_size, term_days),
        })
    }

    /// Share of each fee dollar the platform keeps
    pub fn platform_take(&self) -> f64 {
        if self.total_fee > 0.0 {
            self.platform_revenue / self.total_fee
        } else {
            0.0
        }
    }
}

fn annualise(fee: f64, principal: f64, term_days: f64) -> f64 {
    if principal > 0.0 {
        fee / principal * (DAYS_PER_YEAR / term_days)
    } else {
        0.0
    }
}

/// Platform cost to a borrower against a typical payday loan of the same size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaydayComparison {
    pub platform_fee: f64,
    pub platform_apr: f64,
    pub payday_fee: f64,
    pub payday_apr: f64,
    /// Positive when the platform is cheaper
    pub consumer_savings: f64,
}

impl PaydayComparison {
    pub fn from_set(set: &AssumptionSet) -> Result<Self> {
        let loan = LoanEconomics::from_set(set)?;
        let term_days = set.required_count(names::LOAN_TERM_DAYS)?.max(1) as f64;
        let payday_fee = loan.loan_size / 100.0 * set.required(names::PAYDAY_FEE_PER_100)?;

        Ok(Self {
            platform_fee: loan.total_fee,
            platform_apr: loan.apr,
            payday_fee,
            payday_apr: annualise(payday_fee, loan.loan_size, term_days),
            consumer_savings: payday_fee - loan.total_fee,
        })
    }
}

/// Returns to capital providers over a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakerMetrics {
    pub total_yield_paid: f64,
    pub average_capital: f64,
    /// Yield per unit of average capital per year
    pub annualised_yield: f64,
    /// Funded originations per period over average capital
    pub capital_efficiency: f64,
    pub peak_utilization: f64,
    pub total_unmet_demand: f64,
}

impl StakerMetrics {
    pub fn from_run(run: &ProjectionRun) -> Self {
        let total = |m: Metric| run.series(m).map(MetricSeries::total).unwrap_or(0.0);
        let periods = run.grid.len() as f64;
        let years = periods / run.grid.cadence().periods_per_year() as f64;

        let total_yield_paid = total(Metric::YieldPaid);
        let average_capital = total(Metric::CapitalSupplied) / periods;
        let average_originations = total(Metric::Originations) / periods;

        let (annualised_yield, capital_efficiency) = if average_capital > 0.0 {
            (
                total_yield_paid / average_capital / years,
                average_originations / average_capital,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            total_yield_paid,
            average_capital,
            annualised_yield,
            capital_efficiency,
            peak_utilization: run.series(Metric::Utilization).map(MetricSeries::max).unwrap_or(0.0),
            total_unmet_demand: total(Metric::UnmetDemand),
        }
    }
}

/// One projection year of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnualSummary {
    /// 1-based projection year
    pub year: u32,
    /// Periods of the grid falling in this year (the last year may be partial)
    pub periods: u32,
    pub originations: f64,
    pub unmet_demand: f64,
    pub gross_revenue: f64,
    pub losses: f64,
    pub yield_paid: f64,
    pub net_revenue: f64,
    pub ending_active_users: f64,
    pub ending_outstanding: f64,
    pub ending_capital: f64,
}

/// Roll a run up by projection year
pub fn annual_summary(run: &ProjectionRun) -> Vec<AnnualSummary> {
    let grid = &run.grid;
    let mut years: Vec<AnnualSummary> = (0..grid.years())
        .map(|y| AnnualSummary {
            year: y as u32 + 1,
            ..Default::default()
        })
        .collect();

    let at = |m: Metric, t: usize| run.value(m, t).unwrap_or(0.0);

    for t in 0..grid.len() {
        let row = &mut years[grid.year_of(t)];
        row.periods += 1;
        row.originations += at(Metric::Originations, t);
        row.unmet_demand += at(Metric::UnmetDemand, t);
        row.gross_revenue += at(Metric::GrossRevenue, t);
        row.losses += at(Metric::Losses, t);
        row.yield_paid += at(Metric::YieldPaid, t);
        row.net_revenue += at(Metric::NetRevenue, t);
        row.ending_active_users = at(Metric::ActiveUsers, t);
        row.ending_outstanding = at(Metric::OutstandingBalance, t);
        row.ending_capital = at(Metric::CapitalSupplied, t);
    }

    years
}

/// Headline figures for investors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentMetrics {
    pub years: u32,
    pub first_year_gross_revenue: f64,
    pub final_year_gross_revenue: f64,
    pub first_year_net_revenue: f64,
    pub final_year_net_revenue: f64,
    /// Compound annual growth of gross revenue between the first and final
    /// years; undefined for a single year or a non-positive endpoint
    pub revenue_cagr: Option<f64>,
    pub final_year_originations: f64,
    pub cumulative_net_revenue: f64,
}

impl InvestmentMetrics {
    pub fn from_run(run: &ProjectionRun) -> Self {
        let annual = annual_summary(run);
        let first = annual.first().cloned().unwrap_or_default();
        let last = annual.last().cloned().unwrap_or_default();
        let years = annual.len() as u32;

        let revenue_cagr = if years >= 2 && first.gross_revenue > 0.0 && last.gross_revenue > 0.0 {
            Some((last.gross_revenue / first.gross_revenue).powf(1.0 / (years - 1) as f64) - 1.0)
        } else {
            None
        };

        Self {
            years,
            first_year_gross_revenue: first.gross_revenue,
            final_year_gross_revenue: last.gross_revenue,
            first_year_net_revenue: first.net_revenue,
            final_year_net_revenue: last.net_revenue,
            revenue_cagr,
            final_year_originations: last.originations,
            cumulative_net_revenue: run.horizon_value(Metric::CumulativeNetRevenue).unwrap_or(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::AssumptionRegistry;
    use crate::projection::{project, Cadence, TimeGrid};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn set(overrides: &[(&str, f64)]) -> AssumptionSet {
        AssumptionRegistry::standard()
            .build_set(overrides.iter().copied())
            .unwrap()
    }

    fn run(periods: u32) -> ProjectionRun {
        let grid = TimeGrid::monthly(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), periods).unwrap();
        project(&set(&[]), &grid).unwrap()
    }

    #[test]
    fn test_loan_economics_defaults() {
        let loan = LoanEconomics::from_set(&set(&[])).unwrap();

        // $30 at 18.75% spread for one period plus a 10% fee
        assert_relative_eq!(loan.interest_fee, 5.625, max_relative = 1e-12);
        assert_relative_eq!(loan.origination_fee, 3.0, max_relative = 1e-12);
        assert_relative_eq!(loan.total_fee, 8.625, max_relative = 1e-12);
        assert_relative_eq!(loan.platform_revenue, 1.725, max_relative = 1e-12);
        assert_relative_eq!(loan.staker_revenue, 6.9, max_relative = 1e-12);
        assert_relative_eq!(loan.apr, 8.625 / 30.0 * 365.0 / 30.0, max_relative = 1e-12);
        assert_relative_eq!(loan.platform_take(), 0.2, max_relative = 1e-12);
    }

    #[test]
    fn test_longer_term_earns_more_interest() {
        let short = LoanEconomics::from_set(&set(&[])).unwrap();
        let long = LoanEconomics::from_set(&set(&[(names::LOAN_TERM, 3.0)])).unwrap();
        assert_relative_eq!(long.interest_fee, 3.0 * short.interest_fee, max_relative = 1e-12);
        assert_eq!(long.origination_fee, short.origination_fee);
    }

    #[test]
    fn test_payday_comparison() {
        let cmp = PaydayComparison::from_set(&set(&[
            (names::INTEREST_SPREAD, 0.05),
            (names::FEE_RATE, 0.02),
        ]))
        .unwrap();

        // $15 per $100 on a $30 loan
        assert_relative_eq!(cmp.payday_fee, 4.5, max_relative = 1e-12);
        assert_relative_eq!(cmp.payday_apr, 0.15 * 365.0 / 30.0, max_relative = 1e-12);
        assert_relative_eq!(cmp.platform_fee, 2.1, max_relative = 1e-12);
        assert!(cmp.consumer_savings > 0.0);
        assert!(cmp.platform_apr < cmp.payday_apr);
    }

    #[test]
    fn test_annual_summary_matches_run_totals() {
        let run = run(30);
        let annual = annual_summary(&run);

        assert_eq!(annual.len(), 3);
        assert_eq!(annual.iter().map(|y| y.periods).collect::<Vec<_>>(), vec![12, 12, 6]);
        assert_eq!(annual[2].year, 3);

        let net: f64 = annual.iter().map(|y| y.net_revenue).sum();
        assert_relative_eq!(
            net,
            run.horizon_value(Metric::CumulativeNetRevenue).unwrap(),
            max_relative = 1e-9
        );
        assert_eq!(annual[2].ending_capital, run.horizon_value(Metric::CapitalSupplied).unwrap());
    }

    #[test]
    fn test_investment_metrics() {
        let metrics = InvestmentMetrics::from_run(&run(36));
        assert_eq!(metrics.years, 3);
        // Adoption keeps growing over three years
        assert!(metrics.revenue_cagr.unwrap() > 0.0);
        assert!(metrics.final_year_gross_revenue > metrics.first_year_gross_revenue);

        let single_year = InvestmentMetrics::from_run(&run(12));
        assert_eq!(single_year.revenue_cagr, None);
    }

    #[test]
    fn test_staker_metrics() {
        let metrics = StakerMetrics::from_run(&run(12));

        // Twelve monthly payouts at 1.15% of a growing base
        assert!(metrics.annualised_yield > 12.0 * 0.0115 * 0.99);
        assert!(metrics.annualised_yield < 12.0 * 0.0115 * 1.01);
        assert!(metrics.peak_utilization > 0.0 && metrics.peak_utilization <= 1.0);
        assert_eq!(metrics.total_unmet_demand, 0.0);
    }

    #[test]
    fn test_staker_metrics_quarterly_annualisation() {
        let grid = TimeGrid::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), Cadence::Quarterly, 8).unwrap();
        let run = project(&set(&[]), &grid).unwrap();
        let metrics = StakerMetrics::from_run(&run);

        // Four payouts a year at the per-period rate
        assert_relative_eq!(metrics.annualised_yield, 4.0 * 0.0115, max_relative = 1e-9);
    }
}
