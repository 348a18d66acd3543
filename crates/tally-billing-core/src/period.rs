//! Billing periods.
//!
//! A billing period is a calendar month in UTC, represented as the half-open
//! interval `[start, end)`. Periods key every derived record, so their byte
//! encoding sorts chronologically.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BillingError, Result};

/// A closed-open calendar month `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillingPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl BillingPeriod {
    /// The period covering the given calendar month.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if `month` is not in `1..=12`.
    pub fn month(year: i32, month: u32) -> Result<Self> {
        let start = month_start(year, month).ok_or(BillingError::InvalidPeriod { year, month })?;
        let (next_year, next_month) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = month_start(next_year, next_month)
            .ok_or(BillingError::InvalidPeriod { year, month })?;
        Ok(Self { start, end })
    }

    /// The period that contains the given instant.
    #[must_use]
    pub fn containing(instant: DateTime<Utc>) -> Self {
        // Every DateTime<Utc> has a valid year and month.
        Self::month(instant.year(), instant.month()).unwrap_or_else(|_| unreachable!())
    }

    /// Inclusive start of the period.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end of the period.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// The following month.
    #[must_use]
    pub fn next(&self) -> Self {
        Self::containing(self.end)
    }

    /// The preceding month.
    #[must_use]
    pub fn previous(&self) -> Self {
        Self::containing(self.start - Duration::seconds(1))
    }

    /// Whether `instant` falls inside `[start, end)`.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether the period has fully elapsed at `now`.
    #[must_use]
    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }

    /// Sortable 8-byte key (big-endian Unix seconds of `start`).
    #[must_use]
    pub fn key(&self) -> [u8; 8] {
        // Flipping the sign bit keeps pre-1970 periods ordered as well.
        let shifted = self.start.timestamp() ^ i64::MIN;
        shifted.to_be_bytes()
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.start.year(), self.start.month())
    }
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_bounds() {
        let period = BillingPeriod::month(2020, 2).unwrap();
        assert_eq!(period.start(), Utc.with_ymd_and_hms(2020, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end(), Utc.with_ymd_and_hms(2020, 3, 1, 0, 0, 0).unwrap());
        assert_eq!((period.end() - period.start()).num_days(), 29);
    }

    #[test]
    fn december_rolls_over() {
        let period = BillingPeriod::month(2020, 12).unwrap();
        assert_eq!(period.next(), BillingPeriod::month(2021, 1).unwrap());
        assert_eq!(period.next().previous(), period);
    }

    #[test]
    fn invalid_month() {
        assert!(matches!(
            BillingPeriod::month(2020, 13),
            Err(BillingError::InvalidPeriod { month: 13, .. })
        ));
    }

    #[test]
    fn half_open_interval() {
        let period = BillingPeriod::month(2020, 6).unwrap();
        assert!(period.contains(period.start()));
        assert!(!period.contains(period.end()));
        assert!(!period.is_closed_at(period.end() - Duration::seconds(1)));
        assert!(period.is_closed_at(period.end()));
    }

    #[test]
    fn keys_sort_chronologically() {
        let earlier = BillingPeriod::month(1969, 12).unwrap();
        let later = BillingPeriod::month(2020, 1).unwrap();
        assert!(earlier.key() < later.key());
        assert!(later.key() < later.next().key());
    }

    #[test]
    fn display_format() {
        let period = BillingPeriod::containing(Utc.with_ymd_and_hms(2020, 7, 20, 5, 0, 0).unwrap());
        assert_eq!(period.to_string(), "2020-07");
    }
}
