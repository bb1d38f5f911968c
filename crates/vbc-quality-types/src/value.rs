//! Defensive parsing of clinical values reported as free text

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Result type for value parsing
pub type ValueResult<T> = Result<T, ValueError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Text that is not a plain decimal number (`"pending"`, `">14"`, `""`)
    #[error("Malformed clinical value: '{raw}'")]
    Malformed { raw: String },

    #[error("Invalid period: {start} is after {end}")]
    InvalidPeriod {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },
}

impl ValueError {
    pub fn malformed(raw: impl Into<String>) -> Self {
        Self::Malformed { raw: raw.into() }
    }
}

/// Parse a lab result value
///
/// Accepts plain decimal text with optional surrounding whitespace and sign.
/// Qualified results (`"<5"`, `">14"`), units glued to the number (`"7.2%"`),
/// status words and empty strings are rejected rather than coerced.
pub fn parse_lab_value(raw: &str) -> ValueResult<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValueError::malformed(raw));
    }
    Decimal::from_str(trimmed).map_err(|_| ValueError::malformed(raw))
}
