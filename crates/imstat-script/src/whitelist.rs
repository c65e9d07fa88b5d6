//! Static safety check
//!
//! A script is safe when every function it calls is on the allow-list and it
//! never assigns outside its own scope (`<<-`). The check runs on the parsed
//! program, before anything is evaluated.

use crate::ast::{Expr, Program};
use crate::builtins;
use crate::parser::parse_program;
use crate::runtime::{ScriptError, ScriptResult};

/// First construct that makes `program` unsafe, if any
pub fn unsafe_construct(program: &Program) -> Option<String> {
    let mut found: Option<String> = None;
    program.walk(&mut |expr| {
        if found.is_some() {
            return;
        }
        match expr {
            Expr::Call(call) if !builtins::is_allowed(&call.name) => {
                found = Some(format!("{}()", call.name));
            }
            Expr::Assign { global: true, name, .. } => {
                found = Some(format!("{} <<-", name));
            }
            _ => {}
        }
    });
    found
}

/// Parse `code` and verify it is safe to run
pub fn check_script(code: &str) -> ScriptResult<Program> {
    let program = parse_program(code)?;
    match unsafe_construct(&program) {
        Some(construct) => Err(ScriptError::Unsafe(construct)),
        None => Ok(program),
    }
}

/// Whether `code` parses and passes the safety check
pub fn is_script_safe(code: &str) -> bool {
    check_script(code).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("x > 3", true)]
    #[case("local({ m <- mean(x, na.rm = TRUE)\n x > m })", true)]
    #[case("ifelse(is.na(x), FALSE, x %in% c(1, 2))", true)]
    #[case("system('rm -rf /')", false)]
    #[case("local({ eval(y) })", false)]
    #[case("mean(get('x'))", false)]
    #[case("local({ x <<- 1 })", false)]
    #[case("x >", false)]
    fn test_is_script_safe(#[case] code: &str, #[case] safe: bool) {
        assert_eq!(is_script_safe(code), safe);
    }

    #[test]
    fn test_reports_first_construct() {
        let err = check_script("a <- file('x'); system('y')").unwrap_err();
        assert_eq!(err, ScriptError::Unsafe("file()".to_string()));
        assert_eq!(err.to_string(), "Script is not safe because of: file()");
    }

    #[test]
    fn test_parse_failure_is_not_unsafe() {
        assert!(matches!(check_script("(("), Err(ScriptError::Parse(_))));
    }
}
