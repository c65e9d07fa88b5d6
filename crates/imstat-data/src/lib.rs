//! imstat-data - Column model for statistical datasets
//!
//! This crate holds the in-memory representation the rest of imstat works on:
//!
//! - **Label / LabelDictionary**: ordered code → text mapping per coded column
//! - **Column**: continuous doubles or coded integers plus their dictionary
//! - **DataSet**: columns, row count and the row filter (script mask and
//!   label-level exclusions)
//! - **Coercion**: turning raw text cells into a typed column
//!
//! # Missing values
//!
//! Continuous columns use NaN. Coded columns use `Option<i32>` in memory; the
//! reserved [`MISSING_CODE`] sentinel only exists at the exchange boundary.

pub mod coerce;
pub mod column;
pub mod dataset;
pub mod error;
pub mod label;

pub use coerce::*;
pub use column::*;
pub use dataset::*;
pub use error::*;
pub use label::*;

// Setup UniFFI when the feature is enabled
#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();
