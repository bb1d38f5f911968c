//! Core data types for quality measure evaluation
//!
//! - [`Patient`] demographics and calendar-age arithmetic
//! - [`ClinicalEvent`] and its kinds (encounters, diagnoses, procedures,
//!   lab results, medications)
//! - [`MeasurementPeriod`] and [`DateRange`] windows
//! - Defensive parsing of free-text lab values

pub mod event;
pub mod patient;
pub mod period;
pub mod value;

pub use event::*;
pub use patient::*;
pub use period::*;
pub use value::*;
