pub mod infer;

use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

pub use infer::{infer_captured_at, split_extension};

/// Compact date format used by configuration files and report names.
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// A calendar year-month, used as an enumeration hint for slow backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn next(&self) -> Option<Self> {
        self.first_day()
            .and_then(|d| d.checked_add_months(Months::new(1)))
            .map(Self::of)
    }

    /// File-name prefix for this period, e.g. `202003`.
    pub fn prefix(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Half-open date range `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

impl DateWindow {
    pub fn new(min: NaiveDate, max: NaiveDate) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.min && date < self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min >= self.max
    }

    /// Every year-month whose first day falls before `max`, starting with the
    /// month containing `min`.
    pub fn months(&self) -> Vec<YearMonth> {
        let mut months = Vec::new();
        let mut current = Some(YearMonth::of(self.min));
        while let Some(ym) = current {
            match ym.first_day() {
                Some(first) if first < self.max => months.push(ym),
                _ => break,
            }
            current = ym.next();
        }
        months
    }
}

/// Parse `yyyyMMdd`, also accepting `yyyy-MM-dd`.
pub fn parse_compact_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, COMPACT_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .ok()
}
