//! Dataset: columns, row count and row filter

use crate::column::Column;
use crate::error::{DataError, DataResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A dataset shared between its owner and the bridge
pub type SharedDataSet = Arc<RwLock<DataSet>>;

/// Row filter state of a dataset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Filter expression as the user typed it
    pub general_filter: String,

    /// Result of the last successful filter script, if any
    pub script_mask: Option<Vec<bool>>,
}

/// Columns of equal length plus the filter that applies to them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    columns: Vec<Column>,
    row_count: usize,
    filter: Filter,
}

impl DataSet {
    /// Create a dataset from columns that all have the same length
    pub fn new(columns: Vec<Column>) -> DataResult<Self> {
        let row_count = columns.first().map_or(0, |c| c.len());
        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(DataError::LengthMismatch {
                expected: row_count,
                actual: bad.len(),
            });
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name() == column.name()) {
                return Err(DataError::ColumnExists(column.name().to_string()));
            }
        }
        Ok(Self {
            columns,
            row_count,
            filter: Filter::default(),
        })
    }

    /// A dataset with `row_count` rows and no columns yet
    pub fn with_rows(row_count: usize) -> Self {
        Self {
            columns: Vec::new(),
            row_count,
            filter: Filter::default(),
        }
    }

    /// Wrap the dataset for sharing
    pub fn into_shared(self) -> SharedDataSet {
        Arc::new(RwLock::new(self))
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name() == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// Append a column
    pub fn add_column(&mut self, column: Column) -> DataResult<()> {
        if self.column(column.name()).is_some() {
            return Err(DataError::ColumnExists(column.name().to_string()));
        }
        self.check_length(column.len())?;
        self.columns.push(column);
        Ok(())
    }

    /// Replace the column called `name`, keeping its position
    pub fn replace_column(&mut self, name: &str, mut column: Column) -> DataResult<()> {
        self.check_length(column.len())?;
        let index = self
            .column_index(name)
            .ok_or_else(|| DataError::ColumnNotFound(name.to_string()))?;
        column.set_name(name);
        self.columns[index] = column;
        Ok(())
    }

    /// `base`, or `base` followed by the smallest numeric suffix not yet taken
    pub fn unique_column_name(&self, base: &str) -> String {
        if self.column(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|i| format!("{}{}", base, i))
            .find(|candidate| self.column(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn set_general_filter(&mut self, expression: impl Into<String>) {
        self.filter.general_filter = expression.into();
    }

    /// Store the result of a filter script
    pub fn set_script_mask(&mut self, mask: Vec<bool>) -> DataResult<()> {
        self.check_length(mask.len())?;
        self.filter.script_mask = Some(mask);
        Ok(())
    }

    pub fn clear_script_mask(&mut self) {
        self.filter.script_mask = None;
    }

    /// Combined row mask: script mask AND every column's label-level filter
    pub fn filter_mask(&self) -> Vec<bool> {
        let filtered_columns: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| c.labels().needs_filter())
            .collect();

        (0..self.row_count)
            .map(|row| {
                let script = self
                    .filter
                    .script_mask
                    .as_ref()
                    .and_then(|m| m.get(row).copied())
                    .unwrap_or(true);
                script && filtered_columns.iter().all(|c| c.row_allowed(row))
            })
            .collect()
    }

    /// Number of rows passing [`DataSet::filter_mask`]
    pub fn filtered_row_count(&self) -> usize {
        self.filter_mask().iter().filter(|keep| **keep).count()
    }

    fn check_length(&self, actual: usize) -> DataResult<()> {
        if actual != self.row_count {
            return Err(DataError::LengthMismatch {
                expected: self.row_count,
                actual,
            });
        }
        Ok(())
    }
}

/// Supplies the dataset the bridge works on. Returns `None` while no dataset
/// is loaded.
pub trait DatasetProvider {
    fn current_dataset(&self) -> Option<SharedDataSet>;
}

impl DatasetProvider for SharedDataSet {
    fn current_dataset(&self) -> Option<SharedDataSet> {
        Some(Arc::clone(self))
    }
}

impl DatasetProvider for Option<SharedDataSet> {
    fn current_dataset(&self) -> Option<SharedDataSet> {
        self.clone()
    }
}
