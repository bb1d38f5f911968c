//! CLI functionality for the quality measure tool
//!
//! This module contains:
//! - Session setup from fact bundles, definition bundles and config files
//! - Measure listing and detail
//! - Run execution
//! - Patient views
//! - Data validation
//! - Output formatting

pub mod measures;
pub mod output;
pub mod patient;
pub mod run;
pub mod session;
pub mod validate;
