//! Revenue and margin: fee income, interest spread, loss provisioning, staker yield

use super::capital::CapitalAllocation;
use super::grid::TimeGrid;
use super::loans::LoanBook;
use super::series::{Metric, MetricSeries};
use crate::assumptions::{names, AssumptionSet};
use crate::error::Result;

/// Revenue inputs resolved from an assumption set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevenueParams {
    /// Interest earned per period on outstanding principal
    pub interest_spread: f64,
    /// Fee charged on each unit of originated principal
    pub fee_rate: f64,
}

impl RevenueParams {
    pub fn from_set(set: &AssumptionSet) -> Result<Self> {
        Ok(Self {
            interest_spread: set.required(names::INTEREST_SPREAD)?,
            fee_rate: set.required(names::FEE_RATE)?,
        })
    }

    pub fn gross(&self, outstanding: f64, originations: f64) -> f64 {
        self.interest_spread * outstanding + self.fee_rate * originations
    }
}

/// Per-period platform financials
#[derive(Debug, Clone, PartialEq)]
pub struct Financials {
    pub gross_revenue: MetricSeries,
    pub loss_provision: MetricSeries,
    pub net_revenue: MetricSeries,
    pub cumulative_net_revenue: MetricSeries,
}

/// Combine loan-book and capital series into revenue and margin.
///
/// `net = gross - losses - yield_paid`; the cumulative series is the running sum of net.
pub fn aggregate_financials(
    loans: &LoanBook,
    capital: &CapitalAllocation,
    set: &AssumptionSet,
    grid: &TimeGrid,
) -> Result<Financials> {
    let params = RevenueParams::from_set(set)?;
    let periods = grid.len();

    let mut gross = Vec::with_capacity(periods);
    let mut provision = Vec::with_capacity(periods);
    let mut net = Vec::with_capacity(periods);
    let mut cumulative = Vec::with_capacity(periods);
    let mut running = 0.0;

    for t in 0..periods {
        let outstanding = loans.outstanding_balance.value(t).unwrap_or(0.0);
        let originated = loans.originations.value(t).unwrap_or(0.0);
        let losses = loans.losses.value(t).unwrap_or(0.0);
        let yield_paid = capital.yield_paid.value(t).unwrap_or(0.0);

        let g = params.gross(outstanding, originated);
        let n = g - losses - yield_paid;
        running += n;

        gross.push(g);
        provision.push(losses);
        net.push(n);
        cumulative.push(running);
    }

    Ok(Financials {
        gross_revenue: MetricSeries::from_values(Metric::GrossRevenue, grid, gross),
        loss_provision: MetricSeries::from_values(Metric::LossProvision, grid, provision),
        net_revenue: MetricSeries::from_values(Metric::NetRevenue, grid, net),
        cumulative_net_revenue: MetricSeries::from_values(Metric::CumulativeNetRevenue, grid, cumulative),
    })
}
