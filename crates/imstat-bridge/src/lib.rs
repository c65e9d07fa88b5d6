//! imstat-bridge - Data exchange between imstat datasets and scripts
//!
//! This crate connects the column model of `imstat-data` with the script
//! runtime of `imstat-script`:
//!
//! - **Encoder**: user column names to script identifiers and back
//! - **Exchange**: marshalling columns into a single-slot exchange buffer,
//!   with type conversion, label indices and row filtering
//! - **Filter**: sandboxed evaluation of filter expressions to row masks
//! - **Write-back**: storing script results as dataset columns
//! - **Config**: names and tokens the bridge uses
//!
//! # Architecture
//!
//! All state lives in a [`BridgeContext`]: the dataset provider, the runtime,
//! the name encoding table and the buffer slot. The dataset itself is owned
//! elsewhere and resolved again at the start of every operation.
//!
//! ```text
//! DatasetProvider ──> BridgeContext ──> ScriptRuntime
//!                       │      │
//!              NameEncoding  BufferSlot
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use imstat_bridge::{BridgeContext, ColumnSpec};
//! use imstat_script::NativeRuntime;
//!
//! let mut ctx = BridgeContext::new(Box::new(dataset), Box::new(NativeRuntime::new()));
//! let mask = ctx.apply_filter("age > 30", "")?;
//! let buffer = ctx.marshal(&[ColumnSpec::actual("age")], true)?;
//! ```

pub mod config;
pub mod context;
pub mod encoder;
pub mod error;
pub mod exchange;
pub mod filter;

pub use config::{BridgeConfig, ConfigError};
pub use context::BridgeContext;
pub use encoder::{ColumnEncoder, NameEncoder, NameEncoding};
pub use error::{BridgeError, FilterError, Result};
pub use exchange::{
    BufferSlot, ColumnDescription, ColumnSpec, ExchangeBuffer, ExchangeRecord, Payload,
    ROW_INDEX_NAME,
};
pub use filter::{column_vector, DatasetView, INCOMPREHENSIBLE_FILTER};
