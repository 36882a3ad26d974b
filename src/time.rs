//! Calendar types for time-window and season selection.
//!
//! Time windows are inclusive on both ends and may be given at year, month,
//! or day granularity ("2000", "2000-06", "2000-06-15"). A year bound covers
//! the whole year, a month bound the whole month.
//!
//! Seasons are the meteorological three-month seasons; `ANN` selects all
//! timesteps. Any other token fails fast rather than silently defaulting.

use crate::errors::{DiagResult, DiagnosticError};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar bound at year, month, or day granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartialDate {
    Year(i32),
    YearMonth(i32, u32),
    Day(NaiveDate),
}

impl PartialDate {
    /// First calendar day covered by this bound.
    pub fn first_day(&self) -> NaiveDate {
        match *self {
            PartialDate::Year(y) => NaiveDate::from_ymd_opt(y, 1, 1).expect("valid year"),
            PartialDate::YearMonth(y, m) => {
                NaiveDate::from_ymd_opt(y, m, 1).expect("valid year-month")
            }
            PartialDate::Day(d) => d,
        }
    }

    /// Last calendar day covered by this bound.
    pub fn last_day(&self) -> NaiveDate {
        match *self {
            PartialDate::Year(y) => NaiveDate::from_ymd_opt(y, 12, 31).expect("valid year"),
            PartialDate::YearMonth(y, m) => last_day_of_month(y, m),
            PartialDate::Day(d) => d,
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_y, next_m, 1)
        .expect("valid year-month")
        .pred_opt()
        .expect("not the first representable day")
}

impl FromStr for PartialDate {
    type Err = DiagnosticError;

    /// Parse `"yyyy"`, `"yyyy-mm"`, or `"yyyy-mm-dd"`.
    fn from_str(s: &str) -> DiagResult<Self> {
        let invalid = || DiagnosticError::Error(format!("invalid time bound: {}", s));
        let parts: Vec<&str> = s.split('-').collect();
        match parts.as_slice() {
            [y] => {
                let year: i32 = y.parse().map_err(|_| invalid())?;
                // chrono's representable year range
                if NaiveDate::from_ymd_opt(year, 1, 1).is_none() {
                    return Err(invalid());
                }
                Ok(PartialDate::Year(year))
            }
            [y, m] => {
                let year = y.parse().map_err(|_| invalid())?;
                let month: u32 = m.parse().map_err(|_| invalid())?;
                if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
                    return Err(invalid());
                }
                Ok(PartialDate::YearMonth(year, month))
            }
            [y, m, d] => {
                let year = y.parse().map_err(|_| invalid())?;
                let month = m.parse().map_err(|_| invalid())?;
                let day = d.parse().map_err(|_| invalid())?;
                NaiveDate::from_ymd_opt(year, month, day)
                    .map(PartialDate::Day)
                    .ok_or_else(invalid)
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PartialDate::Year(y) => write!(f, "{}", y),
            PartialDate::YearMonth(y, m) => write!(f, "{}-{:02}", y, m),
            PartialDate::Day(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// An inclusive calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: PartialDate,
    pub end: PartialDate,
}

impl TimeWindow {
    pub fn new(start: PartialDate, end: PartialDate) -> Self {
        Self { start, end }
    }

    /// Parse a `(start, end)` pair of calendar strings.
    pub fn parse(start: &str, end: &str) -> DiagResult<Self> {
        Ok(Self::new(start.parse()?, end.parse()?))
    }

    /// Whether `date` falls inside the window (inclusive bounds).
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start.first_day() && date <= self.end.last_day()
    }

    /// Token used in output file names, e.g. `2000-2001`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Meteorological season used for timestep filtering.
///
/// `Ann` applies no filtering; the other seasons keep only timesteps whose
/// calendar month falls in the season's three-month set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Season {
    #[default]
    Ann,
    Djf,
    Mam,
    Jja,
    Son,
}

impl Season {
    /// The season's calendar months, or `None` for `Ann`.
    pub fn months(&self) -> Option<[u32; 3]> {
        match self {
            Season::Ann => None,
            Season::Djf => Some([12, 1, 2]),
            Season::Mam => Some([3, 4, 5]),
            Season::Jja => Some([6, 7, 8]),
            Season::Son => Some([9, 10, 11]),
        }
    }

    /// Whether a date's calendar month belongs to this season.
    pub fn contains(&self, date: NaiveDate) -> bool {
        match self.months() {
            None => true,
            Some(months) => months.contains(&date.month()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Ann => "ANN",
            Season::Djf => "DJF",
            Season::Mam => "MAM",
            Season::Jja => "JJA",
            Season::Son => "SON",
        }
    }
}

impl FromStr for Season {
    type Err = DiagnosticError;

    fn from_str(s: &str) -> DiagResult<Self> {
        match s {
            "ANN" => Ok(Season::Ann),
            "DJF" => Ok(Season::Djf),
            "MAM" => Ok(Season::Mam),
            "JJA" => Ok(Season::Jja),
            "SON" => Ok(Season::Son),
            other => Err(DiagnosticError::UnsupportedSeason(other.to_string())),
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
