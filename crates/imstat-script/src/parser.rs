//! Script parser using nom
//!
//! Grammar (lowest precedence first):
//! ```text
//! program    := sep* (statement (sep+ statement)*)? sep*
//! sep        := ';' | newline
//! statement  := ident ('<-' | '<<-' | '=') statement | or_expr
//! or_expr    := and_expr (('||' | '|') and_expr)*
//! and_expr   := not_expr (('&&' | '&') not_expr)*
//! not_expr   := '!' not_expr | comparison
//! comparison := additive (op additive)?
//! additive   := product (('+' | '-') product)*
//! product    := special (('*' | '/') special)*
//! special    := unary (('%in%' | '%%') unary)*
//! unary      := ('-' | '+') unary | power
//! power      := atom ('^' unary)?
//! atom       := number | string | call | keyword | ident | '(' statement ')' | '{' program '}'
//! ```
//!
//! A line break ends a statement unless it follows an infix operator, an
//! opening bracket or a comma. `#` starts a comment outside string literals.

use crate::ast::*;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, multispace1, one_of, space0},
    combinator::{map, not, opt, recognize, value},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use thiserror::Error;

/// Parse errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unterminated string literal")]
    UnterminatedString,
}

/// Deepest nesting of brackets and right-recursive operators accepted
pub const MAX_NESTING: usize = 64;

/// Parse a script into a program
pub fn parse_program(input: &str) -> Result<Program, ParseError> {
    let source = strip_comments(&input.replace("\r\n", "\n"))?;
    if nesting_depth(&source) > MAX_NESTING {
        return Err(ParseError::Parse("expression nested too deeply".to_string()));
    }

    match statements(&source) {
        Ok(("", statements)) => Ok(Program::new(statements)),
        Ok((remaining, _)) => Err(ParseError::Parse(format!(
            "unexpected '{}'",
            snippet(remaining)
        ))),
        Err(e) => Err(ParseError::Parse(format!("{:?}", e))),
    }
}

/// Parse a single expression
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
    let mut program = parse_program(input)?;
    match program.statements.len() {
        1 => Ok(program.statements.remove(0)),
        n => Err(ParseError::Parse(format!("expected one expression, found {}", n))),
    }
}

fn snippet(input: &str) -> &str {
    let end = input
        .char_indices()
        .nth(20)
        .map_or(input.len(), |(i, _)| i);
    let line_end = input.find('\n').unwrap_or(input.len());
    &input[..end.min(line_end)]
}

/// Remove `#` comments that are outside string literals
fn strip_comments(input: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(input.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut in_comment = false;

    for c in input.chars() {
        if in_comment {
            if c == '\n' {
                in_comment = false;
                out.push(c);
            }
            continue;
        }
        match quote {
            Some(q) => {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' && q != '`' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '#' => in_comment = true,
                '"' | '\'' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                _ => out.push(c),
            },
        }
    }

    if quote.is_some() {
        return Err(ParseError::UnterminatedString);
    }
    Ok(out)
}

/// Upper bound on the recursion the grammar needs for `source`.
///
/// Every open bracket counts one level, and so does every prefix or
/// right-associative operator (`!`, unary `-`/`+`, `^`, assignment) until
/// the enclosing bracket closes or a `,`, `;` or line break ends the
/// expression. `source` must already be free of comments.
fn nesting_depth(source: &str) -> usize {
    // operators pending per open bracket; the first entry is the top level
    let mut pending: Vec<usize> = vec![0];
    let mut depth = 0;
    let mut deepest = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut previous = ' ';
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q != '`' {
                escaped = true;
            } else if c == q {
                quote = None;
                previous = c;
            }
            continue;
        }

        let next = chars.peek().copied().unwrap_or(' ');
        let operator = match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                false
            }
            '(' | '{' | '[' => {
                pending.push(0);
                depth += 1;
                false
            }
            ')' | '}' | ']' => {
                if pending.len() > 1 {
                    pending.pop();
                    depth -= 1;
                }
                false
            }
            ',' | ';' | '\n' => {
                if let Some(top) = pending.last_mut() {
                    *top = 0;
                }
                false
            }
            '!' => next != '=',
            '=' => next != '=' && !matches!(previous, '<' | '>' | '!' | '='),
            '^' => true,
            '<' => next == '-',
            '-' | '+' => {
                !(is_identifier_char(previous) || matches!(previous, ')' | ']' | '}' | '"' | '\'' | '`'))
            }
            _ => false,
        };
        if operator {
            if let Some(top) = pending.last_mut() {
                *top += 1;
            }
        }
        if !c.is_whitespace() || c == '\n' {
            previous = c;
        }
        deepest = deepest.max(depth + pending.iter().sum::<usize>());
    }
    deepest
}

/// Surrounding spaces and tabs, but not line breaks
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(space0, inner, space0)
}

/// Surrounding whitespace including line breaks
fn wsnl<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Fold a left-associative chain of `operand (op operand)*`
fn chain<'a>(
    input: &'a str,
    operand: fn(&'a str) -> IResult<&'a str, Expr>,
    op: fn(&'a str) -> IResult<&'a str, BinaryOp>,
) -> IResult<&'a str, Expr> {
    let (input, first) = operand(input)?;
    let (input, rest) = many0(pair(ws(op), preceded(multispace0, operand)))(input)?;

    let result = rest
        .into_iter()
        .fold(first, |acc, (op, e)| Expr::binary(acc, op, e));
    Ok((input, result))
}

fn separator(input: &str) -> IResult<&str, ()> {
    value((), many1(ws(one_of(";\n"))))(input)
}

fn skip_separators(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, tag(";")))))(input)
}

/// Parse a separated list of statements
fn statements(input: &str) -> IResult<&str, Vec<Expr>> {
    delimited(
        skip_separators,
        separated_list0(separator, preceded(space0, statement)),
        skip_separators,
    )(input)
}

/// Parse an assignment or an expression
fn statement(input: &str) -> IResult<&str, Expr> {
    alt((assignment, or_expr))(input)
}

fn assignment(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    let (input, global) = ws(alt((
        value(true, tag("<<-")),
        value(false, tag("<-")),
        value(false, terminated(char('='), not(char('=')))),
    )))(input)?;
    let (input, rhs) = preceded(multispace0, statement)(input)?;
    Ok((input, Expr::assign(name, rhs, global)))
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    chain(input, and_expr, |i| {
        alt((
            value(BinaryOp::OrScalar, tag("||")),
            value(BinaryOp::Or, tag("|")),
        ))(i)
    })
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    chain(input, not_expr, |i| {
        alt((
            value(BinaryOp::AndScalar, tag("&&")),
            value(BinaryOp::And, tag("&")),
        ))(i)
    })
}

fn not_expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(
            preceded(ws(terminated(char('!'), not(char('=')))), not_expr),
            |e| Expr::unary(UnaryOp::Not, e),
        ),
        comparison,
    ))(input)
}

fn comparison(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = additive(input)?;
    let (input, rhs) = opt(pair(ws(comparison_op), preceded(multispace0, additive)))(input)?;

    Ok(match rhs {
        Some((op, rhs)) => (input, Expr::binary(lhs, op, rhs)),
        None => (input, lhs),
    })
}

fn comparison_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Lt, terminated(char('<'), not(char('-')))),
        value(BinaryOp::Gt, char('>')),
    ))(input)
}

fn additive(input: &str) -> IResult<&str, Expr> {
    chain(input, product, |i| {
        alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        ))(i)
    })
}

fn product(input: &str) -> IResult<&str, Expr> {
    chain(input, special, |i| {
        alt((
            value(BinaryOp::Mul, terminated(char('*'), not(char('*')))),
            value(BinaryOp::Div, char('/')),
        ))(i)
    })
}

fn special(input: &str) -> IResult<&str, Expr> {
    chain(input, unary, |i| {
        alt((
            value(BinaryOp::In, tag("%in%")),
            value(BinaryOp::Mod, tag("%%")),
        ))(i)
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('-')), unary), |e| match e {
            Expr::Number(n) => Expr::Number(-n),
            other => Expr::unary(UnaryOp::Neg, other),
        }),
        preceded(ws(char('+')), unary),
        power,
    ))(input)
}

fn power(input: &str) -> IResult<&str, Expr> {
    let (input, base) = atom(input)?;
    let (input, exponent) = opt(preceded(
        ws(alt((tag("^"), tag("**")))),
        preceded(multispace0, unary),
    ))(input)?;

    Ok(match exponent {
        Some(exp) => (input, Expr::binary(base, BinaryOp::Pow, exp)),
        None => (input, base),
    })
}

/// Parse atomic expressions
fn atom(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        delimited(char('('), wsnl(statement), char(')')),
        map(delimited(char('{'), statements, char('}')), Expr::Block),
        map(number, Expr::Number),
        map(string_literal, Expr::Str),
        map(call, Expr::Call),
        map(identifier, keyword_or_ident),
    )))(input)
}

fn keyword_or_ident(name: String) -> Expr {
    match name.as_str() {
        "TRUE" | "T" => Expr::Bool(true),
        "FALSE" | "F" => Expr::Bool(false),
        "NA" | "NA_real_" | "NA_integer_" | "NA_character_" => Expr::Na,
        "NULL" => Expr::Null,
        "Inf" => Expr::Number(f64::INFINITY),
        "NaN" => Expr::Number(f64::NAN),
        _ => Expr::Ident(name),
    }
}

/// Parse a number: `12`, `1.5`, `.5`, `2e-3`, `3L`
fn number(input: &str) -> IResult<&str, f64> {
    let (rest, text) = recognize(tuple((
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;
    let (rest, _) = opt(char('L'))(rest)?;

    match text.parse::<f64>() {
        Ok(n) => Ok((rest, n)),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Float,
        ))),
    }
}

/// Parse a quoted string with backslash escapes
fn string_literal(input: &str) -> IResult<&str, String> {
    let fail = || {
        nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Escaped,
        ))
    };

    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, q @ ('"' | '\''))) => q,
        _ => return Err(fail()),
    };

    let mut out = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[i + c.len_utf8()..], out));
        } else {
            out.push(c);
        }
    }
    Err(fail())
}

/// Parse an identifier: letters, digits, `_` and `.`, not starting with a
/// digit or `_`; or any text between backticks
pub(crate) fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(
            recognize(pair(
                take_while1(|c: char| c.is_alphabetic() || c == '.'),
                take_while(is_identifier_char),
            )),
            |s: &str| s.to_string(),
        ),
        map(
            delimited(char('`'), take_while1(|c: char| c != '`'), char('`')),
            |s: &str| s.to_string(),
        ),
    ))(input)
}

/// Characters that may continue an identifier
pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Parse a function call
fn call(input: &str) -> IResult<&str, Call> {
    let (input, name) = identifier(input)?;
    let (input, _) = space0(input)?;
    let (input, args) = delimited(
        pair(char('('), multispace0),
        separated_list0(wsnl(char(',')), argument),
        pair(multispace0, char(')')),
    )(input)?;

    Ok((input, Call::new(name, args)))
}

fn argument(input: &str) -> IResult<&str, Arg> {
    alt((
        map(
            pair(
                terminated(identifier, ws(terminated(char('='), not(char('='))))),
                wsnl(statement),
            ),
            |(name, value)| Arg::named(name, value),
        ),
        map(wsnl(statement), Arg::positional),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(input: &str) -> Expr {
        parse_expr(input).unwrap()
    }

    #[test]
    fn test_parse_simple_comparison() {
        match single("x > 0") {
            Expr::Binary(lhs, op, rhs) => {
                assert_eq!(*lhs, Expr::Ident("x".into()));
                assert_eq!(op, BinaryOp::Gt);
                assert_eq!(*rhs, Expr::Number(0.0));
            }
            other => panic!("Expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        match single("a | b & c") {
            Expr::Binary(_, BinaryOp::Or, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(_, BinaryOp::And, _)));
            }
            other => panic!("Expected or, got {:?}", other),
        }
    }

    #[test]
    fn test_not_is_looser_than_comparison() {
        match single("!x > 3") {
            Expr::Unary(UnaryOp::Not, inner) => {
                assert!(matches!(*inner, Expr::Binary(_, BinaryOp::Gt, _)));
            }
            other => panic!("Expected not, got {:?}", other),
        }
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        match single("-2^2") {
            Expr::Unary(UnaryOp::Neg, inner) => {
                assert!(matches!(*inner, Expr::Binary(_, BinaryOp::Pow, _)));
            }
            other => panic!("Expected negation, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_forms() {
        let program = parse_program("a <- 1; b = 2\nc <<- a").unwrap();
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(&program.statements[0], Expr::Assign { name, global: false, .. } if name == "a"));
        assert!(matches!(&program.statements[2], Expr::Assign { global: true, .. }));
    }

    #[test]
    fn test_less_than_negative_is_assignment() {
        assert!(matches!(single("x<-3"), Expr::Assign { .. }));
        assert!(matches!(single("x < -3"), Expr::Binary(_, BinaryOp::Lt, _)));
    }

    #[test]
    fn test_parse_call_with_named_args() {
        match single("mean(x, na.rm = TRUE)") {
            Expr::Call(call) => {
                assert_eq!(call.name, "mean");
                assert_eq!(call.args.len(), 2);
                assert_eq!(call.args[1].name.as_deref(), Some("na.rm"));
                assert_eq!(call.args[1].value, Expr::Bool(true));
            }
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_local_block() {
        let program = parse_program("local({\nx <- 1\n\nx > 0\n})").unwrap();
        match &program.statements[0] {
            Expr::Call(call) => match &call.args[0].value {
                Expr::Block(statements) => assert_eq!(statements.len(), 2),
                other => panic!("Expected block, got {:?}", other),
            },
            other => panic!("Expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_line_continuation_after_operator() {
        let program = parse_program("a > 1 &\n  b < 2").unwrap();
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_comments_and_strings() {
        let program = parse_program("x == \"a # not a comment\" # comment\n").unwrap();
        match &program.statements[0] {
            Expr::Binary(_, BinaryOp::Eq, rhs) => {
                assert_eq!(**rhs, Expr::Str("a # not a comment".into()));
            }
            other => panic!("Expected comparison, got {:?}", other),
        }
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(single(r#"'it\'s'"#), Expr::Str("it's".into()));
        assert_eq!(single(r#""""#), Expr::Str(String::new()));
    }

    #[test]
    fn test_in_operator_and_keywords() {
        match single("g %in% c('a', 'b')") {
            Expr::Binary(_, BinaryOp::In, rhs) => assert!(matches!(*rhs, Expr::Call(_))),
            other => panic!("Expected %in%, got {:?}", other),
        }
        assert_eq!(single("NA"), Expr::Na);
        assert_eq!(single("F"), Expr::Bool(false));
        assert_eq!(single("Inf"), Expr::Number(f64::INFINITY));
    }

    #[test]
    fn test_backtick_identifier() {
        assert_eq!(single("`my column`"), Expr::Ident("my column".into()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(single(".5"), Expr::Number(0.5));
        assert_eq!(single("2e-3"), Expr::Number(0.002));
        assert_eq!(single("3L"), Expr::Number(3.0));
        assert_eq!(single(".x"), Expr::Ident(".x".into()));
    }

    #[test]
    fn test_empty_program() {
        assert!(parse_program("").unwrap().statements.is_empty());
        assert!(parse_program("\n;\n").unwrap().statements.is_empty());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let nested = |n: usize| format!("{}x > 1{}", "(".repeat(n), ")".repeat(n));
        assert!(parse_program(&nested(MAX_NESTING / 2)).is_ok());

        let too_deep = ParseError::Parse("expression nested too deeply".to_string());
        assert_eq!(parse_program(&nested(1000)).unwrap_err(), too_deep);
        assert_eq!(parse_program(&format!("{}TRUE", "!".repeat(1000))).unwrap_err(), too_deep);
        assert_eq!(parse_program(&format!("2{}", "^2".repeat(1000))).unwrap_err(), too_deep);
        assert_eq!(parse_program(&"{".repeat(1000)).unwrap_err(), too_deep);
    }

    #[test]
    fn test_nesting_depth_resets_between_statements() {
        let many = "x <- -1\n".repeat(500);
        assert!(parse_program(&many).is_ok());
        assert!(parse_program("f(-1, -2, !a, b <- 3)").is_ok());
        assert!(parse_program("x != 1 & y <= 2 & z == \"((((\"").is_ok());
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_program("x >").is_err());
        assert!(parse_program("(a").is_err());
        assert_eq!(
            parse_program("x == 'open").unwrap_err(),
            ParseError::UnterminatedString
        );
    }
}
