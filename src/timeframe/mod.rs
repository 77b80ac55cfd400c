//! Recency windows for search.
//!
//! A search is narrowed by at most one [`DateFilter`]: either a symbolic
//! [`Timeframe`] resolved against the clock at call time, or an explicit
//! [`DateRange`]. Ranges include `from` and exclude `to`.


use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::RecallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    LastWeek,
    LastMonth,
    LastQuarter,
    LastYear,
    All,
}

impl Timeframe {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::LastWeek => "last_week",
            Timeframe::LastMonth => "last_month",
            Timeframe::LastQuarter => "last_quarter",
            Timeframe::LastYear => "last_year",
            Timeframe::All => "all",
        }
    }

    /// Length of the window, `None` for unbounded
    #[inline]
    pub fn window(self) -> Option<Duration> {
        match self {
            Timeframe::LastWeek => Some(Duration::days(7)),
            Timeframe::LastMonth => Some(Duration::days(30)),
            Timeframe::LastQuarter => Some(Duration::days(90)),
            Timeframe::LastYear => Some(Duration::days(365)),
            Timeframe::All => None,
        }
    }

    #[inline]
    pub fn resolve(self, now: DateTime<Utc>) -> DateRange {
        match self.window() {
            Some(window) => DateRange {
                from: Some(now - window),
                to: Some(now),
            },
            None => DateRange::unbounded(),
        }
    }
}

impl std::fmt::Display for Timeframe {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = RecallError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "last_week" | "week" => Ok(Timeframe::LastWeek),
            "last_month" | "month" => Ok(Timeframe::LastMonth),
            "last_quarter" | "quarter" => Ok(Timeframe::LastQuarter),
            "last_year" | "year" => Ok(Timeframe::LastYear),
            "all" => Ok(Timeframe::All),
            _ => Err(RecallError::InvalidQuery(format!(
                "Unknown timeframe '{}' (expected last_week, last_month, last_quarter, last_year or all)",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    #[inline]
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self { from, to }
    }

    #[inline]
    pub fn unbounded() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    #[inline]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| timestamp >= from) && self.to.is_none_or(|to| timestamp < to)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), RecallError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(RecallError::InvalidQuery(format!(
                "Date range starts after it ends ({} > {})",
                from.to_rfc3339(),
                to.to_rfc3339()
            ))),
            _ => Ok(()),
        }
    }
}

/// The single date restriction of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    Timeframe(Timeframe),
    Range(DateRange),
}

impl DateFilter {
    /// Concrete range to filter by, or `None` when nothing needs filtering
    #[inline]
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<Option<DateRange>, RecallError> {
        let range = match *self {
            DateFilter::Timeframe(timeframe) => timeframe.resolve(now),
            DateFilter::Range(range) => {
                range.validate()?;
                range
            }
        };

        Ok((!range.is_unbounded()).then_some(range))
    }
}
