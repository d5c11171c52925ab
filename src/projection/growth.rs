//! User growth: compounding adoption dampened toward a TAM-derived ceiling

use super::grid::TimeGrid;
use super::series::{Metric, MetricSeries};
use crate::assumptions::{names, AssumptionSet};
use crate::error::Result;

/// Growth inputs resolved from an assumption set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthParams {
    pub initial_users: f64,
    pub growth_rate: f64,
    /// Maximum reachable active users
    pub ceiling: f64,
}

impl GrowthParams {
    pub fn from_set(set: &AssumptionSet) -> Result<Self> {
        let tam = set.required(names::TAM)?;
        let saturation = set.required(names::SATURATION)?;
        let loan_size = set.required(names::AVERAGE_LOAN_SIZE)?;

        // TAM is a currency ceiling; one user is worth one average loan of it
        let ceiling = if loan_size > 0.0 { saturation * tam / loan_size } else { 0.0 };

        Ok(Self {
            initial_users: set.required(names::INITIAL_USERS)?,
            growth_rate: set.required(names::GROWTH_RATE)?,
            ceiling,
        })
    }

    /// True when the trajectory cannot move off its initial value
    pub fn is_flat(&self) -> bool {
        self.growth_rate <= 0.0 || self.ceiling <= 0.0
    }

    /// Active users per period.
    ///
    /// `u[t] = u[t-1] + g * u[t-1] * max(0, 1 - u[t-1] / ceiling)`; the
    /// effective rate decays to zero as adoption reaches the ceiling.
    pub fn trajectory(&self, periods: usize) -> Vec<f64> {
        let mut users = Vec::with_capacity(periods);
        let mut current = self.initial_users;

        for t in 0..periods {
            if t > 0 && !self.is_flat() {
                let headroom = (1.0 - current / self.ceiling).max(0.0);
                current += current * self.growth_rate * headroom;
            }
            users.push(current);
        }

        users
    }
}

/// Project active users over the grid
pub fn project_growth(set: &AssumptionSet, grid: &TimeGrid) -> Result<MetricSeries> {
    let params = GrowthParams::from_set(set)?;
    if params.initial_users > params.ceiling && !params.is_flat() {
        log::debug!(
            "initial users {:.0} already above growth ceiling {:.0}; series stays flat",
            params.initial_users,
            params.ceiling
        );
    }
    Ok(MetricSeries::from_values(
        Metric::ActiveUsers,
        grid,
        params.trajectory(grid.len()),
    ))
}

/// Users joining in each period. Everyone active at period 0 is new.
pub fn new_users(active_users: &MetricSeries, grid: &TimeGrid) -> MetricSeries {
    let active = active_users.values();
    let values = active
        .iter()
        .enumerate()
        .map(|(t, &u)| if t == 0 { u } else { (u - active[t - 1]).max(0.0) })
        .collect();
    MetricSeries::from_values(Metric::NewUsers, grid, values)
}
