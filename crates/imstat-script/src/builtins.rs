//! Built-in functions
//!
//! These are the only functions a script can call. The same list is the
//! allow-list consulted by the static safety check.

use crate::eval::{EvalError, EvalResult};
use crate::value::Vector;
use lazy_static::lazy_static;
use std::collections::HashSet;

lazy_static! {
    /// Every callable function name
    pub static ref FUNCTIONS: HashSet<&'static str> = [
        "abs", "sqrt", "log", "log10", "log2", "exp", "floor", "ceiling", "round",
        "mean", "sd", "median", "min", "max", "sum", "length", "is.na", "ifelse",
        "c", "rep", "as.numeric", "as.character", "as.logical", "nchar", "tolower",
        "toupper", "any", "all", "which", "local", "getwd",
    ]
    .into_iter()
    .collect();
}

/// Whether a function may be called from a script
pub fn is_allowed(name: &str) -> bool {
    FUNCTIONS.contains(name)
}

/// Evaluated call arguments
#[derive(Debug, Default)]
pub(crate) struct Args {
    pub positional: Vec<Vector>,
    pub named: Vec<(String, Vector)>,
}

impl Args {
    /// Match arguments to `formals`: names first, then positions in order
    fn bind(self, function: &str, formals: &[&str]) -> EvalResult<Vec<Option<Vector>>> {
        let mut slots: Vec<Option<Vector>> = vec![None; formals.len()];

        for (name, value) in self.named {
            let index = formals.iter().position(|f| *f == name).ok_or_else(|| {
                EvalError::InvalidArguments(format!("{}: unused argument '{}'", function, name))
            })?;
            slots[index] = Some(value);
        }

        for value in self.positional {
            let slot = slots.iter_mut().find(|s| s.is_none()).ok_or_else(|| {
                EvalError::InvalidArguments(format!("{}: too many arguments", function))
            })?;
            *slot = Some(value);
        }

        Ok(slots)
    }

    /// Positional arguments plus the `na.rm` flag, for variadic summaries
    fn variadic(self, function: &str) -> EvalResult<(Vec<Vector>, bool)> {
        let mut na_rm = false;
        for (name, value) in self.named {
            if name == "na.rm" {
                na_rm = value.to_logical().first().copied().unwrap_or(false);
            } else {
                return Err(EvalError::InvalidArguments(format!(
                    "{}: unused argument '{}'",
                    function, name
                )));
            }
        }
        Ok((self.positional, na_rm))
    }
}

fn required(slot: Option<Vector>, function: &str, formal: &str) -> EvalResult<Vector> {
    slot.ok_or_else(|| {
        EvalError::InvalidArguments(format!("{}: argument '{}' is missing", function, formal))
    })
}

fn numeric_arg(value: &Vector, function: &str) -> EvalResult<Vec<f64>> {
    if value.is_text() {
        return Err(EvalError::TypeError(format!(
            "non-numeric argument to {}",
            function
        )));
    }
    Ok(value.to_numeric())
}

/// Longest vector `rep` may build
pub const MAX_REP_LENGTH: usize = 1 << 24;

/// Validated repeat count for `rep`
fn repeat_count(times: f64, len: usize) -> EvalResult<usize> {
    let invalid = || EvalError::InvalidArguments(format!("rep: invalid 'times' argument {}", times));
    if !times.is_finite() || times < 0.0 || times > MAX_REP_LENGTH as f64 {
        return Err(invalid());
    }
    let times = times.floor() as usize;
    match times.checked_mul(len) {
        Some(total) if total <= MAX_REP_LENGTH => Ok(times),
        _ => Err(invalid()),
    }
}

fn scalar_number(slot: Option<Vector>, default: f64) -> f64 {
    slot.and_then(|v| v.to_numeric().first().copied())
        .unwrap_or(default)
}

fn flag(slot: Option<Vector>) -> bool {
    slot.and_then(|v| v.to_logical().first().copied())
        .unwrap_or(false)
}

/// Numbers of all `values`, with or without missing ones
fn pooled(values: &[Vector], function: &str, na_rm: bool) -> EvalResult<Vec<f64>> {
    let mut out = Vec::new();
    for value in values {
        out.extend(numeric_arg(value, function)?);
    }
    if na_rm {
        out.retain(|x| !x.is_nan());
    }
    Ok(out)
}

/// Call a pure built-in. `local` and `getwd` are handled by the interpreter.
pub(crate) fn call(name: &str, args: Args) -> EvalResult<Vector> {
    match name {
        "abs" => map_numeric(name, args, f64::abs),
        "sqrt" => map_numeric(name, args, f64::sqrt),
        "log10" => map_numeric(name, args, f64::log10),
        "log2" => map_numeric(name, args, f64::log2),
        "exp" => map_numeric(name, args, f64::exp),
        "floor" => map_numeric(name, args, f64::floor),
        "ceiling" => map_numeric(name, args, f64::ceil),

        "log" => {
            let mut slots = args.bind(name, &["x", "base"])?;
            let base = scalar_number(slots[1].take(), std::f64::consts::E);
            let x = numeric_arg(&required(slots[0].take(), name, "x")?, name)?;
            Ok(Vector::Numeric(x.into_iter().map(|v| v.log(base)).collect()))
        }

        "round" => {
            let mut slots = args.bind(name, &["x", "digits"])?;
            let digits = scalar_number(slots[1].take(), 0.0);
            let x = numeric_arg(&required(slots[0].take(), name, "x")?, name)?;
            let scale = 10f64.powi(digits as i32);
            Ok(Vector::Numeric(
                x.into_iter().map(|v| (v * scale).round() / scale).collect(),
            ))
        }

        "mean" | "sd" | "median" => {
            let mut slots = args.bind(name, &["x", "na.rm"])?;
            let na_rm = flag(slots[1].take());
            let x = required(slots[0].take(), name, "x")?;
            let values = pooled(std::slice::from_ref(&x), name, na_rm)?;
            Ok(Vector::number(summarise(name, &values)))
        }

        "sum" | "min" | "max" => {
            let (values, na_rm) = args.variadic(name)?;
            let values = pooled(&values, name, na_rm)?;
            Ok(Vector::number(summarise(name, &values)))
        }

        "any" | "all" => {
            let (values, _) = args.variadic(name)?;
            let flags: Vec<bool> = values.iter().flat_map(|v| v.to_logical()).collect();
            Ok(Vector::logical(if name == "any" {
                flags.iter().any(|b| *b)
            } else {
                flags.iter().all(|b| *b)
            }))
        }

        "length" => {
            let mut slots = args.bind(name, &["x"])?;
            let x = required(slots[0].take(), name, "x")?;
            Ok(Vector::number(x.len() as f64))
        }

        "is.na" => {
            let mut slots = args.bind(name, &["x"])?;
            Ok(Vector::Logical(required(slots[0].take(), name, "x")?.is_na()))
        }

        "which" => {
            let mut slots = args.bind(name, &["x"])?;
            let x = required(slots[0].take(), name, "x")?;
            Ok(Vector::Numeric(
                x.to_logical()
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| **b)
                    .map(|(i, _)| (i + 1) as f64)
                    .collect(),
            ))
        }

        "ifelse" => {
            let mut slots = args.bind(name, &["test", "yes", "no"])?;
            let test = required(slots[0].take(), name, "test")?.to_logical();
            let yes = required(slots[1].take(), name, "yes")?;
            let no = required(slots[2].take(), name, "no")?;
            if_else(&test, &yes, &no)
        }

        "c" => {
            let mut parts = args.positional;
            parts.extend(args.named.into_iter().map(|(_, v)| v));
            Ok(concat(parts))
        }

        "rep" => {
            let mut slots = args.bind(name, &["x", "times"])?;
            let times = scalar_number(slots[1].take(), 1.0);
            let x = required(slots[0].take(), name, "x")?;
            let times = repeat_count(times, x.len())?;
            Ok(concat(vec![x; times]))
        }

        "as.numeric" => unary(name, args, |x| Ok(Vector::Numeric(x.to_numeric()))),
        "as.character" => unary(name, args, |x| Ok(Vector::Text(x.to_text()))),
        "as.logical" => unary(name, args, |x| Ok(Vector::Logical(x.to_logical()))),

        "nchar" => unary(name, args, |x| {
            Ok(Vector::Numeric(
                x.to_text()
                    .iter()
                    .map(|s| s.as_ref().map_or(f64::NAN, |s| s.chars().count() as f64))
                    .collect(),
            ))
        }),
        "tolower" => unary(name, args, |x| Ok(map_text(x, |s| s.to_lowercase()))),
        "toupper" => unary(name, args, |x| Ok(map_text(x, |s| s.to_uppercase()))),

        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn unary(
    name: &str,
    args: Args,
    f: impl FnOnce(&Vector) -> EvalResult<Vector>,
) -> EvalResult<Vector> {
    let mut slots = args.bind(name, &["x"])?;
    let x = required(slots[0].take(), name, "x")?;
    f(&x)
}

fn map_numeric(name: &str, args: Args, f: fn(f64) -> f64) -> EvalResult<Vector> {
    unary(name, args, |x| {
        Ok(Vector::Numeric(numeric_arg(x, name)?.into_iter().map(f).collect()))
    })
}

fn map_text(x: &Vector, f: impl Fn(&str) -> String) -> Vector {
    Vector::Text(x.to_text().iter().map(|s| s.as_deref().map(&f)).collect())
}

/// Reduce numbers with a summary function; any NaN left in makes it NA
fn summarise(name: &str, values: &[f64]) -> f64 {
    if values.iter().any(|x| x.is_nan()) {
        return f64::NAN;
    }
    let n = values.len() as f64;
    match name {
        "sum" => values.iter().sum(),
        "min" => values.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "mean" => {
            if values.is_empty() {
                f64::NAN
            } else {
                values.iter().sum::<f64>() / n
            }
        }
        "sd" => {
            if values.len() < 2 {
                return f64::NAN;
            }
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        }
        "median" => {
            if values.is_empty() {
                return f64::NAN;
            }
            let mut sorted = values.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
        _ => f64::NAN,
    }
}

/// Concatenate vectors; the result has the most general element type
pub(crate) fn concat(parts: Vec<Vector>) -> Vector {
    let parts: Vec<Vector> = parts.into_iter().filter(|p| !matches!(p, Vector::Null)).collect();

    if parts.iter().any(|p| p.is_text()) {
        Vector::Text(parts.iter().flat_map(|p| p.to_text()).collect())
    } else if parts.iter().any(|p| matches!(p, Vector::Numeric(_))) {
        Vector::Numeric(parts.iter().flat_map(|p| p.to_numeric()).collect())
    } else if parts.is_empty() {
        Vector::Null
    } else {
        Vector::Logical(parts.iter().flat_map(|p| p.to_logical()).collect())
    }
}

fn if_else(test: &[bool], yes: &Vector, no: &Vector) -> EvalResult<Vector> {
    let n = test.len();
    if n > 0 && (yes.is_empty() || no.is_empty()) {
        return Err(EvalError::InvalidArguments(
            "ifelse: 'yes' and 'no' must not be empty".to_string(),
        ));
    }

    let pick = |i: usize| -> Vector {
        if test[i] {
            pick_element(yes, i)
        } else {
            pick_element(no, i)
        }
    };
    Ok(concat((0..n).map(pick).collect()))
}

fn pick_element(v: &Vector, i: usize) -> Vector {
    let i = i % v.len().max(1);
    match v {
        Vector::Null => Vector::Null,
        Vector::Logical(x) => Vector::Logical(vec![x[i]]),
        Vector::Numeric(x) => Vector::Numeric(vec![x[i]]),
        Vector::Text(x) => Vector::Text(vec![x[i].clone()]),
    }
}
