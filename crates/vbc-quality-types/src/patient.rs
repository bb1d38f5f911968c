//! Patient demographics

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable, unique patient identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Administrative sex as recorded in the source system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
    Other,
    Unknown,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "female"),
            Sex::Male => write!(f, "male"),
            Sex::Other => write!(f, "other"),
            Sex::Unknown => write!(f, "unknown"),
        }
    }
}

/// Patient demographics
///
/// Patients are immutable once loaded; upstream correction feeds replace the
/// whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    /// Stable identifier
    pub id: PatientId,
    /// Medical record number
    pub mrn: String,
    pub first_name: String,
    pub last_name: String,
    /// Date of birth
    pub birth_date: NaiveDate,
    pub sex: Sex,
    /// Free-form demographic attributes (race, ethnicity, payer, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Patient {
    /// Create a patient with empty name fields
    pub fn new(id: impl Into<String>, birth_date: NaiveDate, sex: Sex) -> Self {
        let id = id.into();
        Self {
            mrn: id.clone(),
            id: PatientId(id),
            first_name: String::new(),
            last_name: String::new(),
            birth_date,
            sex,
            attributes: BTreeMap::new(),
        }
    }

    /// Set first and last name
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    /// Set the medical record number
    pub fn with_mrn(mut self, mrn: impl Into<String>) -> Self {
        self.mrn = mrn.into();
        self
    }

    /// "First Last", trimmed when either part is missing
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Age in whole years on `as_of`
    ///
    /// Calendar-age semantics: a birthday not yet reached in the `as_of` year
    /// does not count. Returns a negative value when `as_of` precedes birth.
    pub fn age_on(&self, as_of: NaiveDate) -> i32 {
        age_in_years(self.birth_date, as_of)
    }
}

/// Whole years between `birth_date` and `as_of`
pub fn age_in_years(birth_date: NaiveDate, as_of: NaiveDate) -> i32 {
    let mut years = as_of.year() - birth_date.year();
    // Adjust if birthday hasn't occurred yet this year
    if (as_of.month(), as_of.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    years
}
