//! Error types for assumption validation and projection runs

use chrono::NaiveDate;
use thiserror::Error;

/// An assumption value or name was rejected before any computation started
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("assumption '{name}' = {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown assumption '{name}'")]
    UnknownAssumption { name: String },

    #[error("assumption '{name}' must be a finite number (got {value})")]
    NotFinite { name: String, value: f64 },

    #[error("assumption '{name}' is a count and must be a whole number (got {value})")]
    NotIntegral { name: String, value: f64 },

    /// A model stage needs an assumption the registry in use does not declare
    #[error("assumption '{name}' is required but not declared by the registry")]
    MissingAssumption { name: String },
}

impl ValidationError {
    /// Name of the offending assumption
    pub fn assumption(&self) -> &str {
        match self {
            ValidationError::OutOfRange { name, .. }
            | ValidationError::UnknownAssumption { name }
            | ValidationError::NotFinite { name, .. }
            | ValidationError::NotIntegral { name, .. }
            | ValidationError::MissingAssumption { name } => name,
        }
    }
}

/// Errors surfaced by the projection engine, scenario comparator and loaders
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("time grid must contain at least one period")]
    EmptyTimeGrid,

    #[error("horizon {horizon} is before start {start}")]
    InvalidHorizon { start: NaiveDate, horizon: NaiveDate },

    #[error("time grid overflows the calendar after {periods} periods from {start}")]
    CalendarOverflow { start: NaiveDate, periods: u32 },

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("scenario '{0}' is defined more than once")]
    DuplicateScenario(String),

    #[error("unknown assumption kind '{0}'")]
    UnknownKind(String),

    #[error("malformed value '{value}' in {file}: {reason}")]
    Parse {
        file: String,
        value: String,
        reason: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
