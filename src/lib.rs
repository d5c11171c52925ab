//! Microlending projection engine - deterministic multi-period financial projections
//!
//! This library provides:
//! - A bounded assumption registry with CSV-loadable defaults and scenarios
//! - User growth, loan book (cohort runoff, defaults, losses), staker capital and yield
//! - Revenue and margin aggregation per period and cumulatively
//! - Parallel scenario comparison and one-at-a-time sensitivity analysis
//! - A process-wide cache of finished projection runs
//! - Per-loan and investor-facing economics

pub mod error;
pub mod assumptions;
pub mod projection;
pub mod scenario;
pub mod cache;
pub mod economics;

// Re-export commonly used types
pub use error::{ProjectionError, Result, ValidationError};
pub use assumptions::{AssumptionRegistry, AssumptionSet};
pub use projection::{Cadence, Metric, MetricSeries, ProjectionEngine, ProjectionRun, TimeGrid};
pub use scenario::{compare, ComparisonTable, Scenario, ScenarioComparator, SensitivityEntry};
pub use cache::{Fingerprint, ProjectionCache};
