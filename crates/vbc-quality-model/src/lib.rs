//! Clinical fact store abstraction
//!
//! This crate provides:
//! - The [`FactStore`] trait consumed by the evaluation engine
//! - Immutable, version-stamped [`FactSnapshot`]s with point and range queries
//! - An in-memory store implementation
//! - JSON fact bundles and data-quality checks over them

pub mod bundle;
pub mod memory;
pub mod provider;
pub mod snapshot;

pub use bundle::*;
pub use memory::*;
pub use provider::*;
pub use snapshot::*;
