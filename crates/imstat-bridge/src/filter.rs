//! Filter evaluation
//!
//! A filter is a script returning one logical value per row. Before it runs,
//! column names are replaced by their identifiers, the whole script is
//! wrapped in `local({ ... })` and checked against the function allow-list.
//! The dataset is then attached as a lazy [`DatasetView`] that only reads
//! the columns the script mentions.

use crate::context::BridgeContext;
use crate::encoder::NameEncoding;
use crate::error::FilterError;
use imstat_data::{Column, ColumnValues, SharedDataSet};
use imstat_script::{check_script, ColumnSource, ScriptError, ScriptRuntime, Vector};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Diagnostic for failures the runtime gave no message for
pub const INCOMPREHENSIBLE_FILTER: &str =
    "Filter returned something incomprehensible, make sure you entered all columnnames *exactly* right.";

/// Read-only view on the columns a script uses, keyed by identifier
pub struct DatasetView {
    data: SharedDataSet,
    columns: HashMap<String, String>,
    rows: usize,
}

impl DatasetView {
    /// View on `names` (original column names) of `data`
    pub fn new(data: SharedDataSet, names: &BTreeSet<String>, encoding: &NameEncoding, rows: usize) -> Self {
        let columns = names
            .iter()
            .filter_map(|name| {
                encoding
                    .columns()
                    .lookup(name)
                    .map(|id| (id.to_string(), name.clone()))
            })
            .collect();
        Self {
            data,
            columns,
            rows,
        }
    }

    /// Identifiers this view answers to
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.columns.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl ColumnSource for DatasetView {
    fn row_count(&self) -> usize {
        self.rows
    }

    fn column(&self, name: &str) -> Option<Vector> {
        let original = self.columns.get(name)?;
        let data = self.data.read().ok()?;
        data.column(original).map(column_vector)
    }
}

/// Script value of a column: numbers for continuous columns, label texts
/// for coded ones
pub fn column_vector(column: &Column) -> Vector {
    match column.values() {
        ColumnValues::Continuous(values) => Vector::Numeric(values.clone()),
        ColumnValues::Coded(codes) => Vector::Text(
            codes
                .iter()
                .map(|c| c.and_then(|c| column.labels().text_for(c)).map(String::from))
                .collect(),
        ),
    }
}

/// Detaches the dataset view and unbinds the row count when dropped
struct Attached<'a> {
    runtime: &'a mut dyn ScriptRuntime,
    name: &'a str,
    row_count_name: &'a str,
}

impl<'a> Attached<'a> {
    fn new(
        runtime: &'a mut dyn ScriptRuntime,
        name: &'a str,
        row_count_name: &'a str,
        view: Option<DatasetView>,
    ) -> Self {
        let rows = view.as_ref().map_or(0, |v| v.rows);
        runtime.bind_row_count(row_count_name, rows);
        if let Some(view) = view {
            runtime.attach_data(name, Box::new(view));
        }
        Self {
            runtime,
            name,
            row_count_name,
        }
    }
}

impl Drop for Attached<'_> {
    fn drop(&mut self) {
        self.runtime.detach_data(self.name);
        self.runtime.unbind_row_count(self.row_count_name);
    }
}

fn wrap(script: &str) -> String {
    format!("local({{{}}})", script)
}

impl BridgeContext {
    /// Evaluate `expression`, preceded by `generated_prefix`, to a row mask.
    ///
    /// An empty expression or the match-all token selects every row without
    /// running anything.
    pub fn apply_filter(
        &mut self,
        expression: &str,
        generated_prefix: &str,
    ) -> Result<Vec<bool>, FilterError> {
        let dataset = self
            .provider
            .current_dataset()
            .ok_or_else(|| FilterError::Precondition("No dataset loaded".to_string()))?;
        let rows = {
            let data = dataset
                .read()
                .map_err(|_| FilterError::Precondition("Dataset lock poisoned".to_string()))?;
            self.register_columns(&data);
            data.row_count()
        };

        if expression.is_empty() || expression == self.config.match_all_token {
            return Ok(vec![true; rows]);
        }

        let (encoded, used) = self
            .encoding
            .encode_script(&format!("{}\n{}", generated_prefix, expression));
        let wrapped = wrap(&encoded);

        if let Err(e) = check_script(&wrapped) {
            let error = match e {
                ScriptError::Unsafe(construct) => FilterError::Unsafe {
                    construct: self.encoding.decode_all(&construct),
                },
                other => FilterError::Script(self.encoding.decode_all(&other.to_string())),
            };
            warn!(error = %error, "filter rejected");
            return Err(error);
        }

        debug!(columns = used.len(), rows, "running filter");
        let view = DatasetView::new(dataset, &used, &self.encoding, rows);
        let result = {
            let attached = Attached::new(
                self.runtime.as_mut(),
                &self.config.data_name,
                &self.config.row_count_name,
                Some(view),
            );
            attached.runtime.reset_error_message();
            attached.runtime.run_filter_script(&wrapped)
        };

        let value = match result {
            Ok(value) => value,
            Err(_) => {
                let mut message = self.encoding.decode_all(&self.runtime.last_error_message());
                if message.is_empty() {
                    message = INCOMPREHENSIBLE_FILTER.to_string();
                }
                self.runtime.set_error_message(&message);
                warn!(error = %message, "filter failed");
                return Err(FilterError::Script(message));
            }
        };

        let found = value.type_name();
        let actual = value.len();
        let mask = match value.into_logical() {
            Some(mask) if mask.len() == rows => mask,
            _ => {
                return Err(FilterError::ShapeMismatch {
                    expected: rows,
                    actual,
                    found: found.to_string(),
                })
            }
        };

        if !mask.iter().any(|keep| *keep) {
            return Err(FilterError::Vacuous);
        }
        Ok(mask)
    }

    /// Evaluate free-form code under the same encoding and safety check as a
    /// filter and return its printed result.
    ///
    /// Unsafe code is not run; the returned text explains why and the same
    /// text becomes the runtime's last error.
    pub fn eval_whitelisted(&mut self, code: &str, set_working_dir: bool) -> String {
        let dataset = self.provider.current_dataset();
        let mut rows = 0;
        if let Some(data) = dataset.as_ref().and_then(|d| d.read().ok()) {
            self.register_columns(&data);
            rows = data.row_count();
        }

        self.runtime.reset_error_message();
        let (encoded, used) = self.encoding.encode_script(code);
        let wrapped = wrap(&encoded);

        if let Err(e) = check_script(&wrapped) {
            let message = self.encoding.decode_all(&e.to_string());
            warn!(error = %message, "script rejected");
            self.runtime.set_error_message(&message);
            return message;
        }

        let view = dataset.map(|d| DatasetView::new(d, &used, &self.encoding, rows));
        let result = {
            let attached = Attached::new(
                self.runtime.as_mut(),
                &self.config.data_name,
                &self.config.row_count_name,
                view,
            );
            attached.runtime.eval_script(&wrapped, set_working_dir)
        };

        let decoded = self.encoding.decode_all(&self.runtime.last_error_message());
        self.runtime.set_error_message(&decoded);

        match result {
            Ok(output) => self.encoding.decode_all(&output),
            Err(_) => decoded,
        }
    }

    /// Whether `code` would pass the safety check
    pub fn is_script_safe(&self, code: &str) -> bool {
        let (encoded, _) = self.encoding.encode_script(code);
        check_script(&wrap(&encoded)).is_ok()
    }
}
