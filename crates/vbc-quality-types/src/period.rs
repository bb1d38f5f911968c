//! Measurement periods and date windows

use crate::value::{ValueError, ValueResult};
use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive date range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range; the bounds may be given in either order
    pub fn new(a: NaiveDate, b: NaiveDate) -> Self {
        if a <= b {
            Self { start: a, end: b }
        } else {
            Self { start: b, end: a }
        }
    }

    /// Everything up to and including `end`
    pub fn until(end: NaiveDate) -> Self {
        Self {
            start: NaiveDate::MIN,
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Intersection of two ranges, `None` when disjoint
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateRange { start, end })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == NaiveDate::MIN {
            write!(f, "..{}", self.end)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// The window over which a measure is evaluated
///
/// The reference date for age and lookback arithmetic is the period end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeasurementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MeasurementPeriod {
    /// Create a period, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> ValueResult<Self> {
        if start > end {
            return Err(ValueError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    /// January 1st through December 31st of `year`
    pub fn calendar_year(year: i32) -> ValueResult<Self> {
        match (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(ValueError::malformed(year.to_string())),
        }
    }

    /// Reference date for age and lookback computation
    pub fn reference_date(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn as_range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end,
        }
    }
}

impl fmt::Display for MeasurementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// How a measure derives its period from a reference date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PeriodRule {
    /// Calendar year containing the reference date
    CalendarYear,
    /// The `years` years ending on the reference date
    TrailingYears { years: u32 },
}

impl PeriodRule {
    /// Resolve the measurement period ending at or containing `reference`
    pub fn resolve(&self, reference: NaiveDate) -> MeasurementPeriod {
        match self {
            PeriodRule::CalendarYear => {
                let year = reference.year();
                let start = NaiveDate::from_yo_opt(year, 1).unwrap_or(reference);
                let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(reference);
                MeasurementPeriod { start, end }
            }
            PeriodRule::TrailingYears { years } => {
                let start = years_before(reference, *years)
                    .succ_opt()
                    .unwrap_or(reference)
                    .min(reference);
                MeasurementPeriod {
                    start,
                    end: reference,
                }
            }
        }
    }
}

impl fmt::Display for PeriodRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodRule::CalendarYear => write!(f, "calendar year"),
            PeriodRule::TrailingYears { years: 1 } => write!(f, "most recent 1 year"),
            PeriodRule::TrailingYears { years } => write!(f, "most recent {} years", years),
        }
    }
}

/// Same calendar day `years` years earlier (Feb 29 maps to Feb 28)
///
/// Saturates at [`NaiveDate::MIN`].
pub fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_calendar_year_rule() {
        let period = PeriodRule::CalendarYear.resolve(date(2025, 6, 30));
        assert_eq!(period, MeasurementPeriod::calendar_year(2025).unwrap());
        assert_eq!(period.reference_date(), date(2025, 12, 31));
    }

    #[test]
    fn test_trailing_years_rule() {
        let period = PeriodRule::TrailingYears { years: 2 }.resolve(date(2025, 12, 31));
        assert_eq!(period.start, date(2024, 1, 1));
        assert_eq!(period.end, date(2025, 12, 31));
    }

    #[test]
    fn test_years_before_leap_day() {
        assert_eq!(years_before(date(2024, 2, 29), 1), date(2023, 2, 28));
    }

    #[test]
    fn test_period_rejects_inverted_bounds() {
        let err = MeasurementPeriod::new(date(2025, 2, 1), date(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, ValueError::InvalidPeriod { .. }));
    }

    #[test]
    fn test_range_intersection() {
        let a = DateRange::new(date(2025, 1, 1), date(2025, 6, 30));
        let b = DateRange::until(date(2025, 3, 31));
        assert_eq!(a.intersect(&b), Some(DateRange::new(date(2025, 1, 1), date(2025, 3, 31))));

        let c = DateRange::new(date(2026, 1, 1), date(2026, 2, 1));
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_period_rule_serde() {
        let rule: PeriodRule = serde_json::from_str(r#"{"rule":"trailing_years","years":2}"#).unwrap();
        assert_eq!(rule, PeriodRule::TrailingYears { years: 2 });
        assert_eq!(rule.to_string(), "most recent 2 years");
    }
}
