//! Script evaluation
//!
//! Evaluates parsed programs against variables, read-only bindings and
//! attached column sources.

use crate::ast::*;
use crate::builtins::{self, Args};
use crate::value::{format_number, recycled_len, Vector};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Evaluation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("Object not found: {0}")]
    UnknownVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Cannot assign to read-only variable: {0}")]
    ReadOnly(String),
}

/// Result type for evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Columns a script can read by name
pub trait ColumnSource {
    /// Number of rows of every column
    fn row_count(&self) -> usize;

    /// Values of a column, or `None` if the source has no such column
    fn column(&self, name: &str) -> Option<Vector>;
}

impl ColumnSource for BTreeMap<String, Vector> {
    fn row_count(&self) -> usize {
        self.values().map(|v| v.len()).max().unwrap_or(0)
    }

    fn column(&self, name: &str) -> Option<Vector> {
        self.get(name).cloned()
    }
}

/// Tree-walking interpreter
#[derive(Default)]
pub struct Interpreter {
    globals: HashMap<String, Vector>,
    frames: Vec<HashMap<String, Vector>>,
    constants: HashMap<String, Vector>,
    attached: Vec<(String, Box<dyn ColumnSource>)>,
    working_dir: Option<String>,
}

impl Interpreter {
    /// Create a new interpreter with no variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every statement, returning the value of the last one
    pub fn run(&mut self, program: &Program) -> EvalResult<Vector> {
        self.frames.clear();
        let mut last = Vector::Null;
        for statement in &program.statements {
            last = self.eval(statement)?;
        }
        Ok(last)
    }

    /// Bind a variable that scripts can read but not assign
    pub fn bind_constant(&mut self, name: impl Into<String>, value: Vector) {
        self.constants.insert(name.into(), value);
    }

    /// Remove a constant. Returns whether it was bound.
    pub fn unbind_constant(&mut self, name: &str) -> bool {
        self.constants.remove(name).is_some()
    }

    /// Attach a column source; its columns become readable as variables.
    /// Re-attaching under the same name replaces the earlier source.
    pub fn attach(&mut self, name: impl Into<String>, source: Box<dyn ColumnSource>) {
        let name = name.into();
        self.detach(&name);
        self.attached.push((name, source));
    }

    /// Detach a column source. Returns whether it was attached.
    pub fn detach(&mut self, name: &str) -> bool {
        let before = self.attached.len();
        self.attached.retain(|(n, _)| n != name);
        before != self.attached.len()
    }

    pub fn is_attached(&self, name: &str) -> bool {
        self.attached.iter().any(|(n, _)| n == name)
    }

    pub fn global(&self, name: &str) -> Option<&Vector> {
        self.globals.get(name)
    }

    pub fn set_working_dir(&mut self, dir: Option<String>) {
        self.working_dir = dir;
    }

    fn lookup(&self, name: &str) -> EvalResult<Vector> {
        if let Some(v) = self.frames.iter().rev().find_map(|f| f.get(name)) {
            return Ok(v.clone());
        }
        if let Some(v) = self.globals.get(name).or_else(|| self.constants.get(name)) {
            return Ok(v.clone());
        }
        self.attached
            .iter()
            .rev()
            .find_map(|(_, source)| source.column(name))
            .ok_or_else(|| EvalError::UnknownVariable(name.to_string()))
    }

    fn assign(&mut self, name: &str, value: Vector, global: bool) -> EvalResult<()> {
        if self.constants.contains_key(name) {
            return Err(EvalError::ReadOnly(name.to_string()));
        }
        match self.frames.last_mut() {
            Some(frame) if !global => {
                frame.insert(name.to_string(), value);
            }
            _ => {
                self.globals.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    /// Evaluate a single expression
    pub fn eval(&mut self, expr: &Expr) -> EvalResult<Vector> {
        match expr {
            Expr::Number(n) => Ok(Vector::number(*n)),
            Expr::Str(s) => Ok(Vector::text(s.clone())),
            Expr::Bool(b) => Ok(Vector::logical(*b)),
            Expr::Na => Ok(Vector::na()),
            Expr::Null => Ok(Vector::Null),
            Expr::Ident(name) => self.lookup(name),

            Expr::Unary(op, inner) => {
                let value = self.eval(inner)?;
                unary(*op, &value)
            }

            Expr::Binary(lhs, BinaryOp::AndScalar, rhs) => {
                Ok(Vector::logical(self.first_flag(lhs)? && self.first_flag(rhs)?))
            }

            Expr::Binary(lhs, BinaryOp::OrScalar, rhs) => {
                Ok(Vector::logical(self.first_flag(lhs)? || self.first_flag(rhs)?))
            }

            Expr::Binary(lhs, op, rhs) => {
                let a = self.eval(lhs)?;
                let b = self.eval(rhs)?;
                binary(*op, &a, &b)
            }

            Expr::Call(call) => self.call(call),

            Expr::Assign {
                name,
                value,
                global,
            } => {
                let v = self.eval(value)?;
                self.assign(name, v.clone(), *global)?;
                Ok(v)
            }

            Expr::Block(statements) => {
                let mut last = Vector::Null;
                for statement in statements {
                    last = self.eval(statement)?;
                }
                Ok(last)
            }
        }
    }

    fn first_flag(&mut self, expr: &Expr) -> EvalResult<bool> {
        let value = self.eval(expr)?;
        value
            .to_logical()
            .first()
            .copied()
            .ok_or_else(|| EvalError::TypeError("invalid 'x' type in 'x && y'".to_string()))
    }

    fn call(&mut self, call: &Call) -> EvalResult<Vector> {
        match call.name.as_str() {
            "local" => {
                let body = match call.args.as_slice() {
                    [arg] => &arg.value,
                    _ => {
                        return Err(EvalError::InvalidArguments(
                            "local requires one expression".to_string(),
                        ))
                    }
                };
                self.frames.push(HashMap::new());
                let result = self.eval(body);
                self.frames.pop();
                result
            }

            "getwd" => Ok(match &self.working_dir {
                Some(dir) => Vector::text(dir.clone()),
                None => Vector::Text(vec![None]),
            }),

            name if builtins::is_allowed(name) => {
                let mut args = Args::default();
                for arg in &call.args {
                    let value = self.eval(&arg.value)?;
                    match &arg.name {
                        Some(n) => args.named.push((n.clone(), value)),
                        None => args.positional.push(value),
                    }
                }
                builtins::call(name, args)
            }

            other => Err(EvalError::UnknownFunction(other.to_string())),
        }
    }
}

fn unary(op: UnaryOp, value: &Vector) -> EvalResult<Vector> {
    match op {
        UnaryOp::Not => Ok(Vector::Logical(
            value.to_logical().into_iter().map(|b| !b).collect(),
        )),
        UnaryOp::Neg => {
            if value.is_text() {
                return Err(EvalError::TypeError(
                    "invalid argument to unary operator".to_string(),
                ));
            }
            Ok(Vector::Numeric(
                value.to_numeric().into_iter().map(|x| -x).collect(),
            ))
        }
    }
}

/// Apply an element-wise binary operator, recycling the shorter operand
pub fn binary(op: BinaryOp, a: &Vector, b: &Vector) -> EvalResult<Vector> {
    match op {
        BinaryOp::And | BinaryOp::AndScalar => Ok(logical(a, b, |x, y| x && y)),
        BinaryOp::Or | BinaryOp::OrScalar => Ok(logical(a, b, |x, y| x || y)),
        BinaryOp::In => Ok(in_set(a, b)),
        op if op.is_comparison() => Ok(compare(op, a, b)),
        op => arithmetic(op, a, b),
    }
}

fn logical(a: &Vector, b: &Vector, f: fn(bool, bool) -> bool) -> Vector {
    let (x, y) = (a.to_logical(), b.to_logical());
    let n = recycled_len(x.len(), y.len());
    Vector::Logical((0..n).map(|i| f(x[i % x.len()], y[i % y.len()])).collect())
}

fn arithmetic(op: BinaryOp, a: &Vector, b: &Vector) -> EvalResult<Vector> {
    if a.is_text() || b.is_text() {
        return Err(EvalError::TypeError(format!(
            "non-numeric argument to binary operator '{}'",
            op.as_str()
        )));
    }

    let (x, y) = (a.to_numeric(), b.to_numeric());
    let n = recycled_len(x.len(), y.len());
    let f = |l: f64, r: f64| match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Mod => l - (l / r).floor() * r,
        _ => l.powf(r),
    };
    Ok(Vector::Numeric(
        (0..n).map(|i| f(x[i % x.len()], y[i % y.len()])).collect(),
    ))
}

/// One element of a vector, for comparisons
#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Missing,
    Num(f64),
    Str(String),
}

fn scalars(v: &Vector) -> Vec<Scalar> {
    match v {
        Vector::Null => Vec::new(),
        Vector::Text(values) => values
            .iter()
            .map(|s| match s {
                Some(s) => Scalar::Str(s.clone()),
                None => Scalar::Missing,
            })
            .collect(),
        _ => v
            .to_numeric()
            .into_iter()
            .map(|x| if x.is_nan() { Scalar::Missing } else { Scalar::Num(x) })
            .collect(),
    }
}

/// Order two present scalars. Text compared with a number is read as a
/// number when it parses, otherwise the number is compared as text.
fn order(a: &Scalar, b: &Scalar) -> Option<Ordering> {
    match (a, b) {
        (Scalar::Num(x), Scalar::Num(y)) => x.partial_cmp(y),
        (Scalar::Str(x), Scalar::Str(y)) => Some(x.cmp(y)),
        (Scalar::Num(x), Scalar::Str(s)) => match s.trim().parse::<f64>() {
            Ok(y) => x.partial_cmp(&y),
            Err(_) => Some(format_number(*x).as_str().cmp(s.as_str())),
        },
        (Scalar::Str(_), Scalar::Num(_)) => order(b, a).map(Ordering::reverse),
        _ => None,
    }
}

fn compare(op: BinaryOp, a: &Vector, b: &Vector) -> Vector {
    let (x, y) = (scalars(a), scalars(b));
    let n = recycled_len(x.len(), y.len());

    Vector::Logical(
        (0..n)
            .map(|i| match order(&x[i % x.len()], &y[i % y.len()]) {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Eq => ord == Ordering::Equal,
                    BinaryOp::Ne => ord != Ordering::Equal,
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                },
            })
            .collect(),
    )
}

/// `a %in% b`: whether each element of `a` equals some element of `b`
fn in_set(a: &Vector, b: &Vector) -> Vector {
    let haystack = scalars(b);
    Vector::Logical(
        scalars(a)
            .iter()
            .map(|needle| {
                haystack.iter().any(|h| match (needle, h) {
                    (Scalar::Missing, Scalar::Missing) => true,
                    _ => order(needle, h) == Some(Ordering::Equal),
                })
            })
            .collect(),
    )
}
