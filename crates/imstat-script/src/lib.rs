//! imstat-script - Embedded script runtime for imstat
//!
//! A small vectorised expression language in the style of R, used for
//! filters and computed columns:
//!
//! # Expression Syntax
//!
//! - **Comparisons**: `age > 30 & group == "b"`
//! - **Set membership**: `group %in% c("a", "b")`
//! - **Missing values**: `!is.na(score)`
//! - **Summaries**: `score > mean(score, na.rm = TRUE)`
//! - **Scopes**: `local({ m <- median(x); x > m })`
//!
//! Every value is a vector; scalars are vectors of length one and the
//! shorter operand of an element-wise operator is recycled.
//!
//! # Examples
//!
//! ```ignore
//! use imstat_script::{NativeRuntime, ScriptRuntime};
//!
//! let mut rt = NativeRuntime::new();
//! rt.attach_data("data", Box::new(columns));
//! let mask = rt.run_filter_script("x > 0 & !is.na(y)")?;
//! ```

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod parser;
pub mod runtime;
pub mod value;
pub mod whitelist;

pub use ast::*;
pub use builtins::{is_allowed, FUNCTIONS};
pub use eval::*;
pub use parser::*;
pub use runtime::*;
pub use value::*;
pub use whitelist::*;
