//! Script runtime integration tests

use imstat_script::{is_script_safe, NativeRuntime, ScriptError, ScriptRuntime, Vector, FUNCTIONS};
use proptest::prelude::*;
use rstest::rstest;
use std::collections::BTreeMap;

fn runtime_with(columns: &[(&str, Vector)]) -> NativeRuntime {
    let mut rt = NativeRuntime::new();
    let source: BTreeMap<String, Vector> = columns
        .iter()
        .map(|(name, values)| (name.to_string(), values.clone()))
        .collect();
    rt.bind_row_count("rowcount", source.values().map(Vector::len).max().unwrap_or(0));
    rt.attach_data("data", Box::new(source));
    rt
}

#[rstest]
#[case("local({ x > 1 })", vec![false, true, true])]
#[case("local({ m <- mean(x); x >= m })", vec![false, true, true])]
#[case("local({ g == \"a\" | x == 1 })", vec![true, false, true])]
#[case("local({ ifelse(is.na(g), FALSE, TRUE) })", vec![true, true, true])]
#[case("local({ rep(TRUE, rowcount) })", vec![true, true, true])]
fn test_filter_scripts(#[case] code: &str, #[case] expected: Vec<bool>) {
    let mut rt = runtime_with(&[
        ("x", Vector::Numeric(vec![1.0, 2.0, 3.0])),
        (
            "g",
            Vector::Text(vec![Some("a".into()), Some("b".into()), Some("a".into())]),
        ),
    ]);
    assert_eq!(rt.run_filter_script(code).unwrap(), Vector::Logical(expected));
}

#[test]
fn test_row_count_is_read_only() {
    let mut rt = runtime_with(&[("x", Vector::Numeric(vec![1.0]))]);
    let err = rt.run_script("rowcount <- 3").unwrap_err();
    assert!(matches!(err, ScriptError::Eval(_)));
}

#[test]
fn test_every_allowed_function_is_safe() {
    for name in FUNCTIONS.iter() {
        let code = format!("local({{ {}(1) }})", name);
        assert!(is_script_safe(&code), "{}", code);
    }
}

proptest! {
    #[test]
    fn test_unlisted_functions_are_unsafe(name in "[a-z]{3,10}") {
        prop_assume!(!FUNCTIONS.contains(name.as_str()));
        let code = format!("x <- {}(1)", name);
        prop_assert!(!is_script_safe(&code));
    }

    #[test]
    fn test_comparison_matches_rust(a in -1e6f64..1e6, b in -1e6f64..1e6) {
        let mut rt = NativeRuntime::new();
        let out = rt.eval_script(&format!("{:?} < {:?}", a, b), false).unwrap();
        prop_assert_eq!(out, if a < b { "TRUE" } else { "FALSE" });
    }
}
