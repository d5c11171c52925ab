//! Time grid: contiguous, fixed-cadence projection periods

use crate::error::{ProjectionError, Result};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Period cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Monthly,
    Quarterly,
    Annual,
}

impl Cadence {
    pub fn months_per_period(&self) -> u32 {
        match self {
            Cadence::Monthly => 1,
            Cadence::Quarterly => 3,
            Cadence::Annual => 12,
        }
    }

    pub fn periods_per_year(&self) -> u32 {
        12 / self.months_per_period()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Annual => "annual",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" | "month" | "m" => Ok(Cadence::Monthly),
            "quarterly" | "quarter" | "q" => Ok(Cadence::Quarterly),
            "annual" | "yearly" | "year" | "y" => Ok(Cadence::Annual),
            other => Err(format!("unknown cadence '{}'", other)),
        }
    }
}

/// One period of the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// 0-based position in the grid
    pub index: u32,
    /// First day of the period
    pub start: NaiveDate,
}

/// Ordered, contiguous, non-empty sequence of periods
///
/// Serialized as its bounds; deserializing rebuilds the periods through
/// [`TimeGrid::new`], so an empty or overflowing grid is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GridBounds", into = "GridBounds")]
pub struct TimeGrid {
    start: NaiveDate,
    cadence: Cadence,
    starts: Vec<NaiveDate>,
}

#[derive(Serialize, Deserialize)]
struct GridBounds {
    start: NaiveDate,
    cadence: Cadence,
    periods: u32,
}

impl TryFrom<GridBounds> for TimeGrid {
    type Error = ProjectionError;

    fn try_from(bounds: GridBounds) -> Result<Self> {
        TimeGrid::new(bounds.start, bounds.cadence, bounds.periods)
    }
}

impl From<TimeGrid> for GridBounds {
    fn from(grid: TimeGrid) -> Self {
        GridBounds {
            start: grid.start,
            cadence: grid.cadence,
            periods: grid.starts.len() as u32,
        }
    }
}

impl TimeGrid {
    /// Grid of `periods` periods beginning at `start`
    pub fn new(start: NaiveDate, cadence: Cadence, periods: u32) -> Result<Self> {
        if periods == 0 {
            return Err(ProjectionError::EmptyTimeGrid);
        }

        let step = cadence.months_per_period();
        let starts = (0..periods)
            .map(|i| {
                i.checked_mul(step)
                    .and_then(|months| start.checked_add_months(Months::new(months)))
                    .ok_or(ProjectionError::CalendarOverflow { start, periods })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { start, cadence, starts })
    }

    /// Monthly grid, the common case
    pub fn monthly(start: NaiveDate, periods: u32) -> Result<Self> {
        Self::new(start, Cadence::Monthly, periods)
    }

    /// Grid covering every period that starts on or before `horizon`
    pub fn spanning(start: NaiveDate, horizon: NaiveDate, cadence: Cadence) -> Result<Self> {
        if horizon < start {
            return Err(ProjectionError::InvalidHorizon { start, horizon });
        }

        let mut months = (horizon.year() - start.year()) * 12 + horizon.month() as i32 - start.month() as i32;
        if horizon.day() < start.day() {
            months -= 1;
        }
        let periods = months.max(0) as u32 / cadence.months_per_period() + 1;
        Self::new(start, cadence, periods)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Number of periods
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Always false; an empty grid cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Index of the final period
    pub fn horizon_index(&self) -> usize {
        self.starts.len() - 1
    }

    /// Start date of the final period
    pub fn horizon(&self) -> NaiveDate {
        self.starts[self.horizon_index()]
    }

    pub fn period(&self, index: usize) -> Option<Period> {
        self.starts.get(index).map(|&start| Period {
            index: index as u32,
            start,
        })
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        self.starts.iter().enumerate().map(|(i, &start)| Period {
            index: i as u32,
            start,
        })
    }

    /// 0-based projection year a period falls in
    pub fn year_of(&self, index: usize) -> usize {
        index / self.cadence.periods_per_year() as usize
    }

    /// Number of projection years touched by the grid (last may be partial)
    pub fn years(&self) -> usize {
        self.year_of(self.horizon_index()) + 1
    }

    /// Stable textual form of bounds and cadence, used in fingerprints
    pub fn canonical(&self) -> String {
        format!("{}/{}/{}", self.start, self.cadence, self.len())
    }
}
