//! Label dictionaries for coded columns
//!
//! A dictionary maps integer codes to display text. The order of the labels
//! is the display order and can be changed freely; codes are stable
//! identifiers and are never renumbered by a reorder.

use crate::column::MISSING_CODE;
use crate::error::{DataError, DataResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A single label of a coded column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct Label {
    /// Code stored in the column values
    pub code: i32,

    /// Display text
    pub text: String,

    /// Rows holding this code survive the label-level filter
    pub filter_allowed: bool,

    /// Free-form description
    pub description: String,
}

impl Label {
    /// Create a label that is allowed by the filter and has no description
    pub fn new(code: i32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            filter_allowed: true,
            description: String::new(),
        }
    }
}

/// Ordered code → text mapping for one column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelDictionary {
    labels: Vec<Label>,
}

impl LabelDictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dictionary from integer values: sorted, distinct, text is the
    /// decimal representation of the value. The missing sentinel is skipped.
    pub fn from_values(values: impl IntoIterator<Item = i32>) -> Self {
        let distinct: BTreeSet<i32> = values
            .into_iter()
            .filter(|v| *v != MISSING_CODE)
            .collect();
        Self {
            labels: distinct
                .into_iter()
                .map(|v| Label::new(v, v.to_string()))
                .collect(),
        }
    }

    /// Build a dictionary from `(code, text)` pairs in display order
    pub fn from_pairs<S: Into<String>>(
        pairs: impl IntoIterator<Item = (i32, S)>,
    ) -> DataResult<Self> {
        let mut seen = HashSet::new();
        let mut labels = Vec::new();
        for (code, text) in pairs {
            if code == MISSING_CODE {
                return Err(DataError::ReservedCode(code));
            }
            if !seen.insert(code) {
                return Err(DataError::DuplicateLabel(code));
            }
            labels.push(Label::new(code, text));
        }
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in display order
    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    /// Label texts in display order
    pub fn texts(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.text.clone()).collect()
    }

    pub fn get(&self, code: i32) -> Option<&Label> {
        self.labels.iter().find(|l| l.code == code)
    }

    pub fn contains(&self, code: i32) -> bool {
        self.get(code).is_some()
    }

    /// Display position of a code
    pub fn position(&self, code: i32) -> Option<usize> {
        self.labels.iter().position(|l| l.code == code)
    }

    /// Look up the display text of a code
    pub fn text_for(&self, code: i32) -> Option<&str> {
        self.get(code).map(|l| l.text.as_str())
    }

    /// Look up the code of a display text (first match in display order)
    pub fn code_for(&self, text: &str) -> Option<i32> {
        self.labels.iter().find(|l| l.text == text).map(|l| l.code)
    }

    /// Smallest code greater than every code in use
    pub fn next_free_code(&self) -> i32 {
        self.labels
            .iter()
            .map(|l| l.code)
            .max()
            .map_or(1, |max| max.saturating_add(1))
    }

    /// Append a label at the end of the display order
    pub fn add(&mut self, code: i32, text: impl Into<String>) -> DataResult<()> {
        if code == MISSING_CODE {
            return Err(DataError::ReservedCode(code));
        }
        if self.contains(code) {
            return Err(DataError::DuplicateLabel(code));
        }
        self.labels.push(Label::new(code, text));
        Ok(())
    }

    /// Remove a label, returning it
    pub fn remove(&mut self, code: i32) -> DataResult<Label> {
        let pos = self.position(code).ok_or(DataError::LabelNotFound(code))?;
        Ok(self.labels.remove(pos))
    }

    /// Change the display text of a label
    pub fn rename(&mut self, code: i32, text: impl Into<String>) -> DataResult<()> {
        self.get_mut(code)?.text = text.into();
        Ok(())
    }

    pub fn set_description(&mut self, code: i32, description: impl Into<String>) -> DataResult<()> {
        self.get_mut(code)?.description = description.into();
        Ok(())
    }

    /// Move a contiguous run of display positions one step up or down
    pub fn move_rows(&mut self, positions: &[usize], up: bool) -> DataResult<()> {
        let mut sorted = positions.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let (first, last) = match (sorted.first(), sorted.last()) {
            (Some(&f), Some(&l)) => (f, l),
            _ => return Ok(()),
        };

        if last - first + 1 != sorted.len() {
            return Err(DataError::InvalidMove(format!(
                "positions {:?} are not contiguous",
                positions
            )));
        }
        if last >= self.labels.len() {
            return Err(DataError::InvalidMove(format!(
                "position {} out of range for {} labels",
                last,
                self.labels.len()
            )));
        }

        if up {
            if first == 0 {
                return Err(DataError::InvalidMove("run is already at the top".to_string()));
            }
            self.labels[first - 1..=last].rotate_left(1);
        } else {
            if last + 1 >= self.labels.len() {
                return Err(DataError::InvalidMove(
                    "run is already at the bottom".to_string(),
                ));
            }
            self.labels[first..=last + 1].rotate_right(1);
        }
        Ok(())
    }

    /// Reverse the display order
    pub fn reverse(&mut self) {
        self.labels.reverse();
    }

    pub fn set_filter_allowed(&mut self, code: i32, allowed: bool) -> DataResult<()> {
        self.get_mut(code)?.filter_allowed = allowed;
        Ok(())
    }

    /// Allow every label again
    pub fn reset_filter_allows(&mut self) {
        for label in &mut self.labels {
            label.filter_allowed = true;
        }
    }

    /// Whether rows holding `code` pass the label-level filter.
    /// Unknown codes are not excluded.
    pub fn allows(&self, code: i32) -> bool {
        self.get(code).map_or(true, |l| l.filter_allowed)
    }

    /// True if at least one label is filtered out
    pub fn needs_filter(&self) -> bool {
        self.labels.iter().any(|l| !l.filter_allowed)
    }

    /// Number of labels filtered out
    pub fn filtered_out(&self) -> usize {
        self.labels.iter().filter(|l| !l.filter_allowed).count()
    }

    /// Map each code to its dense 1-based display index
    pub fn dense_indices(&self) -> HashMap<i32, i32> {
        self.labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.code, i as i32 + 1))
            .collect()
    }

    /// Map each code to its display text
    pub fn text_index(&self) -> HashMap<i32, &str> {
        self.labels
            .iter()
            .map(|l| (l.code, l.text.as_str()))
            .collect()
    }

    fn get_mut(&mut self, code: i32) -> DataResult<&mut Label> {
        self.labels
            .iter_mut()
            .find(|l| l.code == code)
            .ok_or(DataError::LabelNotFound(code))
    }
}
