//! Vector values manipulated by scripts
//!
//! Every value is a vector. Scalars are vectors of length one. Missing
//! values are NaN for numbers and `None` for text; logical vectors have no
//! missing state (comparisons involving a missing value are false).

use serde::{Deserialize, Serialize};

/// A script value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Vector {
    Null,
    Logical(Vec<bool>),
    Numeric(Vec<f64>),
    Text(Vec<Option<String>>),
}

impl Vector {
    pub fn number(value: f64) -> Self {
        Vector::Numeric(vec![value])
    }

    pub fn logical(value: bool) -> Self {
        Vector::Logical(vec![value])
    }

    pub fn text(value: impl Into<String>) -> Self {
        Vector::Text(vec![Some(value.into())])
    }

    /// Length-one missing value
    pub fn na() -> Self {
        Vector::Numeric(vec![f64::NAN])
    }

    pub fn len(&self) -> usize {
        match self {
            Vector::Null => 0,
            Vector::Logical(v) => v.len(),
            Vector::Numeric(v) => v.len(),
            Vector::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Type name as shown in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Vector::Null => "NULL",
            Vector::Logical(_) => "logical",
            Vector::Numeric(_) => "numeric",
            Vector::Text(_) => "character",
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Vector::Text(_))
    }

    /// Whether each element is missing
    pub fn is_na(&self) -> Vec<bool> {
        match self {
            Vector::Null => Vec::new(),
            Vector::Logical(v) => vec![false; v.len()],
            Vector::Numeric(v) => v.iter().map(|x| x.is_nan()).collect(),
            Vector::Text(v) => v.iter().map(|s| s.is_none()).collect(),
        }
    }

    /// Numeric view: logicals become 0/1, unparsable text becomes NaN
    pub fn to_numeric(&self) -> Vec<f64> {
        match self {
            Vector::Null => Vec::new(),
            Vector::Logical(v) => v.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect(),
            Vector::Numeric(v) => v.clone(),
            Vector::Text(v) => v
                .iter()
                .map(|s| {
                    s.as_deref()
                        .and_then(|s| s.trim().parse::<f64>().ok())
                        .unwrap_or(f64::NAN)
                })
                .collect(),
        }
    }

    /// Logical view: non-zero numbers and "TRUE"/"true"/"T" are true,
    /// missing values are false
    pub fn to_logical(&self) -> Vec<bool> {
        match self {
            Vector::Null => Vec::new(),
            Vector::Logical(v) => v.clone(),
            Vector::Numeric(v) => v.iter().map(|x| !x.is_nan() && *x != 0.0).collect(),
            Vector::Text(v) => v
                .iter()
                .map(|s| matches!(s.as_deref(), Some("TRUE" | "true" | "T")))
                .collect(),
        }
    }

    /// Text view: numbers use their shortest decimal form
    pub fn to_text(&self) -> Vec<Option<String>> {
        match self {
            Vector::Null => Vec::new(),
            Vector::Logical(v) => v
                .iter()
                .map(|b| Some(if *b { "TRUE" } else { "FALSE" }.to_string()))
                .collect(),
            Vector::Numeric(v) => v
                .iter()
                .map(|x| if x.is_nan() { None } else { Some(format_number(*x)) })
                .collect(),
            Vector::Text(v) => v.clone(),
        }
    }

    /// Consume a logical vector; `None` for any other type
    pub fn into_logical(self) -> Option<Vec<bool>> {
        match self {
            Vector::Logical(v) => Some(v),
            _ => None,
        }
    }

    /// Printed form, one space between elements
    pub fn render(&self) -> String {
        match self {
            Vector::Null => "NULL".to_string(),
            Vector::Logical(v) => v
                .iter()
                .map(|b| if *b { "TRUE" } else { "FALSE" })
                .collect::<Vec<_>>()
                .join(" "),
            Vector::Numeric(v) => v
                .iter()
                .map(|x| if x.is_nan() { "NA".to_string() } else { format_number(*x) })
                .collect::<Vec<_>>()
                .join(" "),
            Vector::Text(v) => v
                .iter()
                .map(|s| match s {
                    Some(s) => format!("\"{}\"", s),
                    None => "NA".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Shortest decimal form; infinities print as `Inf` / `-Inf`
pub fn format_number(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{}", value)
    }
}

/// Length of the result of an element-wise operation on lengths `a` and `b`;
/// the shorter operand is recycled
pub fn recycled_len(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        0
    } else {
        a.max(b)
    }
}
