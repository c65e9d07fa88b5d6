//! Type coercion properties

use imstat_data::{coerce_column, de_europeanise, ColumnType, MAX_NOMINAL_LEVELS};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_de_europeanise_is_idempotent(s in "[0-9.,a-z ]{0,16}") {
        let once = de_europeanise(&s);
        prop_assert_eq!(de_europeanise(&once), once);
    }

    #[test]
    fn test_few_distinct_integers_are_nominal(
        levels in proptest::collection::btree_set(-1000i32..1000, 1..=MAX_NOMINAL_LEVELS),
        picks in proptest::collection::vec(any::<proptest::sample::Index>(), 1..60)
    ) {
        let levels: Vec<i32> = levels.into_iter().collect();
        let values: Vec<i32> = picks.iter().map(|p| levels[p.index(levels.len())]).collect();
        let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let distinct: std::collections::BTreeSet<i32> = values.iter().copied().collect();

        let column = coerce_column("n", &cells, None);
        prop_assert_eq!(column.column_type(), ColumnType::Nominal);
        prop_assert_eq!(column.labels().len(), distinct.len());

        let ordinal = coerce_column("n", &cells, Some(ColumnType::Ordinal));
        prop_assert_eq!(ordinal.column_type(), ColumnType::Ordinal);
    }

    #[test]
    fn test_many_distinct_integers_are_continuous(
        values in proptest::collection::btree_set(-100_000i32..100_000, 25..80)
    ) {
        let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let column = coerce_column("n", &cells, None);
        prop_assert_eq!(column.column_type(), ColumnType::Continuous);
        prop_assert_eq!(column.doubles().map(|d| d.len()), Some(values.len()));
    }

    #[test]
    fn test_missing_tokens_stay_missing(
        mask in proptest::collection::vec(any::<bool>(), 1..30)
    ) {
        let cells: Vec<&str> = mask
            .iter()
            .map(|present| if *present { "7" } else { "NaN" })
            .collect();
        let column = coerce_column("n", &cells, None);
        for (row, present) in mask.iter().enumerate() {
            prop_assert_eq!(column.is_missing(row), !present);
        }
    }
}

#[test]
fn test_all_missing_is_empty_nominal() {
    let column = coerce_column("empty", &["", " ", "nan"], None);
    assert_eq!(column.column_type(), ColumnType::Nominal);
    assert!(column.labels().is_empty());
}
