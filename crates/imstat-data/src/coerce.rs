//! Type coercion: raw text cells → typed column
//!
//! Coercion tries, in order:
//!
//! 1. integers with at most [`MAX_NOMINAL_LEVELS`] distinct values → nominal
//!    (or ordinal when requested)
//! 2. doubles, after normalising decimal commas → continuous
//! 3. anything else → nominal text
//!
//! The last step always succeeds, so coercion cannot fail.

use crate::column::{Column, ColumnType};
use crate::label::{Label, LabelDictionary};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Hard ceiling on distinct integer values for a nominal column
pub const MAX_NOMINAL_LEVELS: usize = 24;

/// Cell values treated as missing. Single spaces appear in SPSS exports.
pub const MISSING_TOKENS: [&str; 4] = ["", " ", "NaN", "nan"];

/// Whether a raw cell is one of the recognised missing tokens
pub fn is_missing_token(value: &str) -> bool {
    MISSING_TOKENS.contains(&value)
}

/// Rewrite a decimal-comma number (`1.234,5`) to use a decimal point
/// (`1234.5`). Strings without exactly one comma are returned unchanged, so
/// applying this twice gives the same result as applying it once.
pub fn de_europeanise(value: &str) -> String {
    if value.matches(',').count() != 1 {
        return value.to_string();
    }

    value
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect()
}

/// Parse a double after decimal-comma normalisation
pub fn parse_double(value: &str) -> Option<f64> {
    de_europeanise(value).parse::<f64>().ok()
}

/// Parse an integer usable as a label code. The missing sentinel is not.
fn parse_code(value: &str) -> Option<i32> {
    value
        .parse::<i32>()
        .ok()
        .filter(|v| *v != crate::column::MISSING_CODE)
}

/// Build a typed column from raw text cells.
///
/// `requested` only chooses between nominal and ordinal for integer columns;
/// the fixed priority order is not negotiable.
pub fn coerce_column<S: AsRef<str>>(
    name: &str,
    values: &[S],
    requested: Option<ColumnType>,
) -> Column {
    let coded_type = match requested {
        Some(ColumnType::Ordinal) => ColumnType::Ordinal,
        _ => ColumnType::Nominal,
    };

    if let Some(column) = try_integer_column(name, values, coded_type) {
        debug!(column = name, column_type = %column.column_type(), "coerced as integer codes");
        return column;
    }

    if let Some(column) = try_continuous_column(name, values) {
        debug!(column = name, "coerced as continuous");
        return column;
    }

    debug!(column = name, "coerced as nominal text");
    text_column(name, values, ColumnType::NominalText)
}

fn try_integer_column<S: AsRef<str>>(
    name: &str,
    values: &[S],
    column_type: ColumnType,
) -> Option<Column> {
    let mut codes = Vec::with_capacity(values.len());
    let mut distinct = BTreeSet::new();

    for value in values {
        let value = value.as_ref();
        if is_missing_token(value) {
            codes.push(None);
            continue;
        }
        let code = parse_code(value)?;
        distinct.insert(code);
        if distinct.len() > MAX_NOMINAL_LEVELS {
            return None;
        }
        codes.push(Some(code));
    }

    let labels = LabelDictionary::from_values(distinct);
    Column::coded(name, column_type, codes, labels).ok()
}

fn try_continuous_column<S: AsRef<str>>(name: &str, values: &[S]) -> Option<Column> {
    let mut doubles = Vec::with_capacity(values.len());

    for value in values {
        let normalised = de_europeanise(value.as_ref());
        if is_missing_token(&normalised) {
            doubles.push(f64::NAN);
        } else {
            doubles.push(normalised.parse::<f64>().ok()?);
        }
    }

    Some(Column::continuous(name, doubles))
}

/// One code per distinct non-missing string, codes `1..=n` in sorted order.
/// Strings that all parse as numbers sort numerically.
fn text_column<S: AsRef<str>>(name: &str, values: &[S], column_type: ColumnType) -> Column {
    let mut distinct: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref())
        .filter(|v| !is_missing_token(v))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let numeric: Option<Vec<f64>> = distinct.iter().map(|s| parse_double(s)).collect();
    if let Some(keys) = numeric {
        let mut paired: Vec<(f64, &str)> = keys.into_iter().zip(distinct).collect();
        paired.sort_by(|a, b| a.0.total_cmp(&b.0));
        distinct = paired.into_iter().map(|(_, s)| s).collect();
    }

    let labels: Vec<Label> = distinct
        .iter()
        .enumerate()
        .map(|(i, text)| Label::new(i as i32 + 1, *text))
        .collect();

    let by_text: HashMap<&str, i32> = labels
        .iter()
        .map(|l| (l.text.as_str(), l.code))
        .collect();
    let codes = values
        .iter()
        .map(|v| {
            let v = v.as_ref();
            if is_missing_token(v) {
                None
            } else {
                by_text.get(v).copied()
            }
        })
        .collect();

    let dict = LabelDictionary::from_pairs(labels.into_iter().map(|l| (l.code, l.text)))
        .unwrap_or_default();
    Column::coded(name, column_type, codes, dict)
        .unwrap_or_else(|_| Column::empty(name, values.len()))
}

/// Re-code display strings as a coded column of type `target`, without the
/// distinct-value ceiling. Used when converting a continuous column.
pub(crate) fn coded_from_strings(name: &str, values: &[String], target: ColumnType) -> Column {
    let all_integer = values
        .iter()
        .filter(|v| !is_missing_token(v))
        .all(|v| parse_code(v).is_some());

    if all_integer {
        let codes: Vec<Option<i32>> = values
            .iter()
            .map(|v| if is_missing_token(v) { None } else { parse_code(v) })
            .collect();
        let labels = LabelDictionary::from_values(codes.iter().flatten().copied());
        if let Ok(column) = Column::coded(name, target, codes, labels) {
            return column;
        }
    }

    text_column(name, values, target)
}
