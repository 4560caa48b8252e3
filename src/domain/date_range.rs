//! Calendar date ranges and batch frequencies.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{BarrageError, Result};

/// Wire format for dates in requests, config and worker payloads.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// An inclusive range of calendar days.
///
/// Constructed only through [`DateRange::new`], which rejects ranges whose
/// start falls after their end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl DateRange {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        if start_date > end_date {
            return Err(BarrageError::InvalidDateRange(format!(
                "start date {} is after end date {}",
                start_date, end_date
            )));
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    /// Parse both ends from `YYYY-MM-DD` strings.
    pub fn parse(start_date: &str, end_date: &str) -> Result<Self> {
        Self::new(parse_date(start_date)?, parse_date(end_date)?)
    }

    /// A range covering exactly one day.
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start_date: day,
            end_date: day,
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Number of calendar days covered, counting both ends.
    pub fn num_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains(&self, other: &DateRange) -> bool {
        self.start_date <= other.start_date && other.end_date <= self.end_date
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.start_date.format(DATE_FORMAT),
            self.end_date.format(DATE_FORMAT)
        )
    }
}

/// Parse a `YYYY-MM-DD` date, mapping failures to `InvalidDateRange`.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        BarrageError::InvalidDateRange(format!("'{}' is not a YYYY-MM-DD date: {}", value, e))
    })
}

/// How a requested date range is subdivided into extraction batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFrequency {
    /// One batch spanning the whole range.
    #[default]
    None,
    Daily,
    /// Sunday through Saturday.
    Weekly,
    /// First through last day of each calendar month.
    Monthly,
}

impl BatchFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchFrequency::None => "none",
            BatchFrequency::Daily => "daily",
            BatchFrequency::Weekly => "weekly",
            BatchFrequency::Monthly => "monthly",
        }
    }

    /// Interpret a template's optional `batch_freq` value; absent means no batching.
    pub fn from_template_value(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(BatchFrequency::None),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for BatchFrequency {
    type Err = BarrageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(BatchFrequency::None),
            "daily" => Ok(BatchFrequency::Daily),
            "weekly" => Ok(BatchFrequency::Weekly),
            "monthly" => Ok(BatchFrequency::Monthly),
            _ => Err(BarrageError::InvalidFrequency(s.to_string())),
        }
    }
}

impl fmt::Display for BatchFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
