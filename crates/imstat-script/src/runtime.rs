//! Script runtime interface and its native implementation

use crate::eval::{ColumnSource, EvalError, Interpreter};
use crate::parser::{parse_program, ParseError};
use crate::value::Vector;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by a script runtime
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScriptError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("Script is not safe because of: {0}")]
    Unsafe(String),
}

/// Result type for script execution
pub type ScriptResult<T> = Result<T, ScriptError>;

/// An embedded scripting runtime.
///
/// Failures are returned and also recorded as the last error message, which
/// callers may rewrite (for instance to restore user-facing names).
pub trait ScriptRuntime {
    /// Run a script for its side effects
    fn run_script(&mut self, code: &str) -> ScriptResult<()>;

    /// Evaluate a script and return its printed result. With
    /// `set_working_dir`, the script sees the data directory as its working
    /// directory.
    fn eval_script(&mut self, code: &str, set_working_dir: bool) -> ScriptResult<String>;

    /// Evaluate a filter script and return its raw result
    fn run_filter_script(&mut self, code: &str) -> ScriptResult<Vector>;

    /// Message of the last failure, empty when there is none
    fn last_error_message(&self) -> String;

    fn set_error_message(&mut self, message: &str);

    fn reset_error_message(&mut self);

    /// Bind a read-only variable holding the row count
    fn bind_row_count(&mut self, name: &str, rows: usize);

    fn unbind_row_count(&mut self, name: &str);

    /// Make the columns of `source` readable by scripts
    fn attach_data(&mut self, name: &str, source: Box<dyn ColumnSource>);

    fn detach_data(&mut self, name: &str);
}

/// Runtime backed by the built-in [`Interpreter`]
#[derive(Default)]
pub struct NativeRuntime {
    interpreter: Interpreter,
    last_error: String,
    data_dir: Option<String>,
}

impl NativeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory reported by `getwd()` in scripts evaluated with
    /// `set_working_dir`
    pub fn with_data_dir(mut self, dir: impl Into<String>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    fn execute(&mut self, code: &str) -> ScriptResult<Vector> {
        let result = parse_program(code)
            .map_err(ScriptError::from)
            .and_then(|program| self.interpreter.run(&program).map_err(ScriptError::from));

        if let Err(e) = &result {
            debug!(error = %e, "script failed");
            self.last_error = e.to_string();
        }
        result
    }
}

impl ScriptRuntime for NativeRuntime {
    fn run_script(&mut self, code: &str) -> ScriptResult<()> {
        self.execute(code).map(|_| ())
    }

    fn eval_script(&mut self, code: &str, set_working_dir: bool) -> ScriptResult<String> {
        if set_working_dir {
            self.interpreter.set_working_dir(self.data_dir.clone());
        }
        let result = self.execute(code).map(|v| v.render());
        self.interpreter.set_working_dir(None);
        result
    }

    fn run_filter_script(&mut self, code: &str) -> ScriptResult<Vector> {
        self.execute(code)
    }

    fn last_error_message(&self) -> String {
        self.last_error.clone()
    }

    fn set_error_message(&mut self, message: &str) {
        self.last_error = message.to_string();
    }

    fn reset_error_message(&mut self) {
        self.last_error.clear();
    }

    fn bind_row_count(&mut self, name: &str, rows: usize) {
        self.interpreter.bind_constant(name, Vector::number(rows as f64));
    }

    fn unbind_row_count(&mut self, name: &str) {
        self.interpreter.unbind_constant(name);
    }

    fn attach_data(&mut self, name: &str, source: Box<dyn ColumnSource>) {
        debug!(data = name, rows = source.row_count(), "attaching data");
        self.interpreter.attach(name, source);
    }

    fn detach_data(&mut self, name: &str) {
        if self.interpreter.detach(name) {
            debug!(data = name, "detached data");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_failure_records_last_error() {
        let mut rt = NativeRuntime::new();
        assert!(rt.run_script("missing_var + 1").is_err());
        assert_eq!(rt.last_error_message(), "Object not found: missing_var");

        rt.reset_error_message();
        assert_eq!(rt.last_error_message(), "");

        rt.set_error_message("custom");
        assert_eq!(rt.last_error_message(), "custom");
    }

    #[test]
    fn test_eval_renders_result() {
        let mut rt = NativeRuntime::new();
        rt.run_script("v <- c(1, 2.5)").unwrap();
        assert_eq!(rt.eval_script("v * 2", false).unwrap(), "2 5");
    }

    #[test]
    fn test_eval_working_dir_only_when_asked() {
        let mut rt = NativeRuntime::new().with_data_dir("/tmp/data");
        assert_eq!(rt.eval_script("getwd()", false).unwrap(), "NA");
        assert_eq!(rt.eval_script("getwd()", true).unwrap(), "\"/tmp/data\"");
        assert_eq!(rt.eval_script("getwd()", false).unwrap(), "NA");
    }

    #[test]
    fn test_filter_with_row_count_and_data() {
        let mut rt = NativeRuntime::new();
        let mut columns = BTreeMap::new();
        columns.insert("x".to_string(), Vector::Numeric(vec![1.0, 5.0, 3.0]));
        rt.bind_row_count("rowcount", 3);
        rt.attach_data("data", Box::new(columns));

        let result = rt.run_filter_script("x > 2 & rowcount == 3").unwrap();
        assert_eq!(result, Vector::Logical(vec![false, true, true]));

        rt.detach_data("data");
        assert!(rt.run_filter_script("x > 2").is_err());

        rt.unbind_row_count("rowcount");
        assert!(rt.run_filter_script("rowcount").is_err());
        rt.run_script("rowcount <- 1").unwrap();
    }
}
