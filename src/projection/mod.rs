//! Projection pipeline: time grid, model stages and the engine that chains them

mod grid;
mod series;
mod growth;
mod loans;
mod capital;
mod revenue;
mod engine;

pub use grid::{Cadence, Period, TimeGrid};
pub use series::{Annotation, Metric, MetricSeries, ProjectionRun, RunSummary, SeriesPoint};
pub use growth::{new_users, project_growth, GrowthParams};
pub use loans::{book_from_originations, origination_demand, simulate_loans, Cohort, CohortArena, LoanBook, LoanParams};
pub use capital::{allocate_capital, CapitalAllocation, CapitalParams};
pub use revenue::{aggregate_financials, Financials, RevenueParams};
pub use engine::{project, ProjectionEngine};
