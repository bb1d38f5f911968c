//! Quality measure definitions
//!
//! This crate provides:
//! - Named, versioned [`CodeSet`]s with exact and prefix entries
//! - The declarative predicate tree measures are composed from
//! - Immutable, versioned [`MeasureDefinition`]s
//! - Append-only registries for code sets and definitions
//! - The built-in HEDIS/HVBP catalog

pub mod catalog;
pub mod code_set;
pub mod definition;
pub mod error;
pub mod predicate;
pub mod registry;

pub use catalog::*;
pub use code_set::*;
pub use definition::*;
pub use error::*;
pub use predicate::*;
pub use registry::*;
