//! Abstract Syntax Tree for scripts
//!
//! This module defines the AST types produced by the script parser.

use serde::{Deserialize, Serialize};

/// A parsed script: a sequence of statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Expr>,
}

impl Program {
    /// Create a program from its statements
    pub fn new(statements: Vec<Expr>) -> Self {
        Self { statements }
    }

    /// Visit every expression in the program, outermost first
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        for statement in &self.statements {
            statement.walk(f);
        }
    }

    /// Names of all functions called anywhere in the program
    pub fn called_functions(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for statement in &self.statements {
            statement.collect_calls(&mut names);
        }
        names
    }
}

/// An expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal
    Number(f64),

    /// String literal
    Str(String),

    /// `TRUE` / `FALSE`
    Bool(bool),

    /// `NA`
    Na,

    /// `NULL`
    Null,

    /// Variable or column reference
    Ident(String),

    /// Prefix operator
    Unary(UnaryOp, Box<Expr>),

    /// Infix operator
    Binary(Box<Expr>, BinaryOp, Box<Expr>),

    /// Function call
    Call(Call),

    /// `name <- value`; `global` for `<<-`
    Assign {
        name: String,
        value: Box<Expr>,
        global: bool,
    },

    /// `{ ... }`
    Block(Vec<Expr>),
}

impl Expr {
    /// Create a binary expression
    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary(Box::new(lhs), op, Box::new(rhs))
    }

    /// Create a unary expression
    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary(op, Box::new(expr))
    }

    /// Create an assignment
    pub fn assign(name: impl Into<String>, value: Expr, global: bool) -> Self {
        Expr::Assign {
            name: name.into(),
            value: Box::new(value),
            global,
        }
    }

    /// Visit this expression and all sub-expressions, outermost first
    pub fn walk(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unary(_, inner) => inner.walk(f),
            Expr::Binary(lhs, _, rhs) => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Expr::Call(call) => {
                for arg in &call.args {
                    arg.value.walk(f);
                }
            }
            Expr::Assign { value, .. } => value.walk(f),
            Expr::Block(statements) => {
                for statement in statements {
                    statement.walk(f);
                }
            }
            Expr::Number(_)
            | Expr::Str(_)
            | Expr::Bool(_)
            | Expr::Na
            | Expr::Null
            | Expr::Ident(_) => {}
        }
    }

    fn collect_calls<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Call(call) => {
                names.push(call.name.as_str());
                for arg in &call.args {
                    arg.value.collect_calls(names);
                }
            }
            Expr::Unary(_, inner) => inner.collect_calls(names),
            Expr::Binary(lhs, _, rhs) => {
                lhs.collect_calls(names);
                rhs.collect_calls(names);
            }
            Expr::Assign { value, .. } => value.collect_calls(names),
            Expr::Block(statements) => {
                for statement in statements {
                    statement.collect_calls(names);
                }
            }
            _ => {}
        }
    }
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

/// Infix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `|` element-wise
    Or,
    /// `||` first element only
    OrScalar,
    /// `&` element-wise
    And,
    /// `&&` first element only
    AndScalar,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `%in%`
    In,
    Add,
    Sub,
    Mul,
    Div,
    /// `%%`
    Mod,
    /// `^`
    Pow,
}

impl BinaryOp {
    /// Whether the operator yields a logical vector from two operands
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Whether the operator is arithmetic
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Pow
        )
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Or => "|",
            BinaryOp::OrScalar => "||",
            BinaryOp::And => "&",
            BinaryOp::AndScalar => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "%in%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%%",
            BinaryOp::Pow => "^",
        }
    }
}

/// A function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Function name
    pub name: String,
    /// Arguments in source order
    pub args: Vec<Arg>,
}

impl Call {
    /// Create a new function call
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// A call argument, optionally named (`na.rm = TRUE`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

impl Arg {
    pub fn positional(value: Expr) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_called_functions_nested() {
        let program = Program::new(vec![Expr::Call(Call::new(
            "local",
            vec![Arg::positional(Expr::Block(vec![Expr::assign(
                "m",
                Expr::Call(Call::new("mean", vec![Arg::positional(Expr::Ident("x".into()))])),
                false,
            )]))],
        ))]);

        assert_eq!(program.called_functions(), vec!["local", "mean"]);
    }

    #[test]
    fn test_walk_visits_identifiers() {
        let expr = Expr::binary(
            Expr::Ident("a".into()),
            BinaryOp::And,
            Expr::unary(UnaryOp::Not, Expr::Ident("b".into())),
        );
        let mut idents = Vec::new();
        expr.walk(&mut |e| {
            if let Expr::Ident(name) = e {
                idents.push(name.clone());
            }
        });
        assert_eq!(idents, vec!["a", "b"]);
    }

    #[test]
    fn test_operator_classes() {
        assert!(BinaryOp::Le.is_comparison());
        assert!(!BinaryOp::In.is_comparison());
        assert!(BinaryOp::Mod.is_arithmetic());
        assert_eq!(BinaryOp::In.as_str(), "%in%");
    }
}
