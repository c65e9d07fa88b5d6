//! Typed columns

use crate::coerce::{self, parse_double};
use crate::error::{DataError, DataResult};
use crate::label::LabelDictionary;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Integer used for a missing coded value at the exchange boundary.
/// Never a legitimate label code.
pub const MISSING_CODE: i32 = i32::MIN;

/// Measurement level of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum ColumnType {
    /// Continuous values stored as doubles
    Continuous,
    /// Ordered categories
    Ordinal,
    /// Unordered categories with numeric labels
    Nominal,
    /// Unordered categories built from free text
    NominalText,
    /// Not determined; when requested, means "use the stored type"
    #[default]
    Unknown,
}

impl ColumnType {
    /// Whether columns of this type store codes plus a label dictionary
    pub fn is_coded(&self) -> bool {
        matches!(
            self,
            ColumnType::Ordinal | ColumnType::Nominal | ColumnType::NominalText
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Continuous => "continuous",
            ColumnType::Ordinal => "ordinal",
            ColumnType::Nominal => "nominal",
            ColumnType::NominalText => "nominalText",
            ColumnType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored values of a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    /// NaN marks a missing value
    Continuous(Vec<f64>),
    /// `None` marks a missing value
    Coded(Vec<Option<i32>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Continuous(v) => v.len(),
            ColumnValues::Coded(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    values: ColumnValues,
    labels: LabelDictionary,
}

impl Column {
    /// Create a continuous column
    pub fn continuous(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Continuous,
            values: ColumnValues::Continuous(values),
            labels: LabelDictionary::new(),
        }
    }

    /// Create a coded column. Every present code must have a label.
    pub fn coded(
        name: impl Into<String>,
        column_type: ColumnType,
        codes: Vec<Option<i32>>,
        labels: LabelDictionary,
    ) -> DataResult<Self> {
        let name = name.into();
        if !column_type.is_coded() {
            return Err(DataError::TypeError(format!(
                "{} is not a coded column type",
                column_type
            )));
        }
        if codes.contains(&Some(MISSING_CODE)) {
            return Err(DataError::ReservedCode(MISSING_CODE));
        }
        let known: HashSet<i32> = labels.iter().map(|l| l.code).collect();
        if let Some(code) = codes.iter().flatten().find(|c| !known.contains(*c)) {
            return Err(DataError::CodeWithoutLabel {
                column: name,
                code: *code,
            });
        }
        Ok(Self {
            name,
            column_type,
            values: ColumnValues::Coded(codes),
            labels,
        })
    }

    /// An empty nominal column with `rows` missing values
    pub fn empty(name: impl Into<String>, rows: usize) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Nominal,
            values: ColumnValues::Coded(vec![None; rows]),
            labels: LabelDictionary::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn labels(&self) -> &LabelDictionary {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Continuous values, if this is a continuous column
    pub fn doubles(&self) -> Option<&[f64]> {
        match &self.values {
            ColumnValues::Continuous(v) => Some(v),
            ColumnValues::Coded(_) => None,
        }
    }

    /// Codes, if this is a coded column
    pub fn codes(&self) -> Option<&[Option<i32>]> {
        match &self.values {
            ColumnValues::Coded(v) => Some(v),
            ColumnValues::Continuous(_) => None,
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        match &self.values {
            ColumnValues::Continuous(v) => v.get(row).map_or(true, |x| x.is_nan()),
            ColumnValues::Coded(v) => v.get(row).map_or(true, |c| c.is_none()),
        }
    }

    /// Text shown for a cell: the label text, the number, or "" when missing
    pub fn display_value(&self, row: usize) -> String {
        match &self.values {
            ColumnValues::Continuous(v) => match v.get(row) {
                Some(x) if !x.is_nan() => format_double(*x),
                _ => String::new(),
            },
            ColumnValues::Coded(v) => v
                .get(row)
                .copied()
                .flatten()
                .and_then(|c| self.labels.text_for(c))
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn display_values(&self) -> Vec<String> {
        match &self.values {
            ColumnValues::Continuous(_) => (0..self.len()).map(|row| self.display_value(row)).collect(),
            ColumnValues::Coded(codes) => {
                let texts = self.labels.text_index();
                codes
                    .iter()
                    .map(|c| {
                        c.and_then(|c| texts.get(&c).copied())
                            .unwrap_or_default()
                            .to_string()
                    })
                    .collect()
            }
        }
    }

    /// Whether a row passes the label-level filter of this column
    pub fn row_allowed(&self, row: usize) -> bool {
        match &self.values {
            ColumnValues::Continuous(_) => true,
            ColumnValues::Coded(v) => match v.get(row).copied().flatten() {
                Some(code) => self.labels.allows(code),
                None => true,
            },
        }
    }

    pub fn add_label(&mut self, code: i32, text: impl Into<String>) -> DataResult<()> {
        self.labels.add(code, text)
    }

    /// Remove a label that no value refers to
    pub fn remove_label(&mut self, code: i32) -> DataResult<()> {
        if let Some(codes) = self.codes() {
            if codes.iter().any(|c| *c == Some(code)) {
                return Err(DataError::LabelInUse {
                    column: self.name.clone(),
                    code,
                });
            }
        }
        self.labels.remove(code).map(|_| ())
    }

    pub fn rename_label(&mut self, code: i32, text: impl Into<String>) -> DataResult<()> {
        self.labels.rename(code, text)
    }

    pub fn set_label_description(
        &mut self,
        code: i32,
        description: impl Into<String>,
    ) -> DataResult<()> {
        self.labels.set_description(code, description)
    }

    pub fn move_labels(&mut self, positions: &[usize], up: bool) -> DataResult<()> {
        self.labels.move_rows(positions, up)
    }

    pub fn reverse_labels(&mut self) {
        self.labels.reverse()
    }

    pub fn set_label_filter_allowed(&mut self, code: i32, allowed: bool) -> DataResult<()> {
        self.labels.set_filter_allowed(code, allowed)
    }

    pub fn reset_filter_allows(&mut self) {
        self.labels.reset_filter_allows()
    }

    /// Produce a copy of this column converted to `target`.
    ///
    /// Coded columns keep codes and labels when switching between coded
    /// types. Converting to continuous parses the label texts; converting a
    /// continuous column to a coded type re-codes its display strings.
    pub fn change_type(&self, target: ColumnType) -> DataResult<Column> {
        if target == self.column_type || target == ColumnType::Unknown {
            return Ok(self.clone());
        }

        match (&self.values, target) {
            (ColumnValues::Coded(_), t) if t.is_coded() => {
                let mut converted = self.clone();
                converted.column_type = t;
                Ok(converted)
            }
            (ColumnValues::Coded(codes), _) => {
                let mut doubles = Vec::with_capacity(codes.len());
                for code in codes {
                    match code {
                        None => doubles.push(f64::NAN),
                        Some(c) => {
                            let text = self.labels.text_for(*c).unwrap_or_default();
                            let value = parse_double(text)
                                .ok_or_else(|| DataError::NotNumeric(text.to_string()))?;
                            doubles.push(value);
                        }
                    }
                }
                Ok(Column::continuous(self.name.clone(), doubles))
            }
            (ColumnValues::Continuous(_), t) => {
                Ok(coerce::coded_from_strings(&self.name, &self.display_values(), t))
            }
        }
    }
}

/// Shortest decimal representation of a double (`1` for 1.0, `2.5` for 2.5)
pub fn format_double(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sex() -> Column {
        let labels = LabelDictionary::from_pairs([(1, "m"), (2, "f")]).unwrap();
        Column::coded(
            "sex",
            ColumnType::Nominal,
            vec![Some(1), Some(2), None, Some(2)],
            labels,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_sentinel_rejected_as_value() {
        let labels = LabelDictionary::from_pairs([(1, "a")]).unwrap();
        let result = Column::coded("c", ColumnType::Nominal, vec![Some(MISSING_CODE), None], labels);
        assert_eq!(result.unwrap_err(), DataError::ReservedCode(MISSING_CODE));
    }

    #[test]
    fn test_coded_rejects_unlabelled_code() {
        let labels = LabelDictionary::from_values([1, 2]);
        let err = Column::coded("x", ColumnType::Nominal, vec![Some(3)], labels).unwrap_err();
        assert_eq!(
            err,
            DataError::CodeWithoutLabel {
                column: "x".to_string(),
                code: 3
            }
        );
    }

    #[test]
    fn test_coded_rejects_continuous_type() {
        let result = Column::coded("x", ColumnType::Continuous, vec![], LabelDictionary::new());
        assert!(matches!(result, Err(DataError::TypeError(_))));
    }

    #[test]
    fn test_display_values() {
        let col = sex();
        assert_eq!(col.display_values(), vec!["m", "f", "", "f"]);

        let scale = Column::continuous("w", vec![1.0, f64::NAN, 2.5]);
        assert_eq!(scale.display_values(), vec!["1", "", "2.5"]);
    }

    #[test]
    fn test_row_allowed_follows_labels() {
        let mut col = sex();
        col.set_label_filter_allowed(2, false).unwrap();
        assert!(col.row_allowed(0));
        assert!(!col.row_allowed(1));
        assert!(col.row_allowed(2)); // missing stays
    }

    #[test]
    fn test_remove_label_in_use() {
        let mut col = sex();
        assert!(matches!(
            col.remove_label(1),
            Err(DataError::LabelInUse { code: 1, .. })
        ));
        col.add_label(3, "x").unwrap();
        col.remove_label(3).unwrap();
    }

    #[test]
    fn test_change_type_coded_to_ordinal_keeps_codes() {
        let col = sex().change_type(ColumnType::Ordinal).unwrap();
        assert_eq!(col.column_type(), ColumnType::Ordinal);
        assert_eq!(col.codes(), sex().codes());
    }

    #[test]
    fn test_change_type_text_to_continuous_fails() {
        let err = sex().change_type(ColumnType::Continuous).unwrap_err();
        assert_eq!(err, DataError::NotNumeric("m".to_string()));
    }

    #[test]
    fn test_change_type_numeric_labels_to_continuous() {
        let labels = LabelDictionary::from_values([1, 5]);
        let col = Column::coded("n", ColumnType::Nominal, vec![Some(5), None, Some(1)], labels)
            .unwrap();
        let scale = col.change_type(ColumnType::Continuous).unwrap();
        let d = scale.doubles().unwrap();
        assert_eq!(d[0], 5.0);
        assert!(d[1].is_nan());
        assert_eq!(d[2], 1.0);
    }

    #[test]
    fn test_change_type_continuous_to_nominal() {
        let scale = Column::continuous("w", vec![1.5, 2.5, 1.5, f64::NAN]);
        let col = scale.change_type(ColumnType::Nominal).unwrap();
        assert_eq!(col.column_type(), ColumnType::Nominal);
        assert_eq!(col.labels().texts(), vec!["1.5", "2.5"]);
        assert!(col.is_missing(3));
    }
}
