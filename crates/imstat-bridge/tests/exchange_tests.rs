//! Exchange buffer integration tests

mod common;

use common::{context, small_dataset, survey};
use imstat_bridge::{BridgeError, ColumnSpec, ROW_INDEX_NAME};
use imstat_data::{ColumnType, MISSING_CODE};
use rstest::rstest;
use std::sync::Arc;

// === Row filtering ===

#[test]
fn test_mask_selects_rows_and_row_index() {
    let data = small_dataset();
    data.write()
        .unwrap()
        .set_script_mask(vec![true, false, true])
        .unwrap();
    let mut ctx = context(&data);

    let buffer = ctx
        .marshal(
            &[ColumnSpec::actual("score"), ColumnSpec::actual("group")],
            true,
        )
        .unwrap();

    assert_eq!(buffer.records().len(), 3);
    assert_eq!(buffer.row_index(), &[1, 3]);
    assert_eq!(buffer.records()[2].name, ROW_INDEX_NAME);
    for record in buffer.columns() {
        assert_eq!(record.row_count, 2);
        assert_eq!(record.payload.len(), 2);
    }
    assert_eq!(buffer.column("score").unwrap().doubles().unwrap(), &[1.5, 3.25]);
    assert_eq!(buffer.column("group").unwrap().ints().unwrap(), &[2, 2]);
}

#[test]
fn test_ignoring_the_filter_sends_every_row() {
    let data = small_dataset();
    data.write()
        .unwrap()
        .set_script_mask(vec![false, false, true])
        .unwrap();
    let mut ctx = context(&data);

    let buffer = ctx.marshal(&[ColumnSpec::actual("group")], false).unwrap();
    assert_eq!(buffer.row_index(), &[1, 2, 3]);
    assert_eq!(buffer.column("group").unwrap().ints().unwrap(), &[2, 1, 2]);
}

#[test]
fn test_label_level_filter_applies() {
    let data = survey();
    {
        let mut guard = data.write().unwrap();
        let column = guard.column_mut("smoker?").unwrap();
        let yes = column.labels().code_for("yes").unwrap();
        column.set_label_filter_allowed(yes, false).unwrap();
    }
    let mut ctx = context(&data);

    let buffer = ctx.read_full_dataset(true).unwrap();
    assert_eq!(buffer.row_index(), &[2, 3, 5]);
}

// === Type conversion ===

#[test]
fn test_continuous_is_bit_exact() {
    let data = small_dataset();
    let mut ctx = context(&data);

    let buffer = ctx
        .marshal(&[ColumnSpec::new("score", ColumnType::Continuous)], false)
        .unwrap();
    let values = buffer.column("score").unwrap().doubles().unwrap();
    assert_eq!(values[0].to_bits(), 1.5f64.to_bits());
    assert!(values[1].is_nan());
    assert_eq!(values[2].to_bits(), 3.25f64.to_bits());
}

#[rstest]
#[case::actual(ColumnType::Unknown, false, true, false)]
#[case::scale(ColumnType::Continuous, false, false, false)]
#[case::nominal(ColumnType::Nominal, false, true, false)]
#[case::ordinal(ColumnType::Ordinal, false, true, true)]
fn test_nominal_conversions(
    #[case] requested: ColumnType,
    #[case] is_scale: bool,
    #[case] has_labels: bool,
    #[case] is_ordinal: bool,
) {
    let data = survey();
    let mut ctx = context(&data);

    let buffer = ctx
        .marshal(&[ColumnSpec::new("rating", requested)], false)
        .unwrap();
    let record = buffer.column("rating").unwrap();
    assert_eq!(record.is_scale, is_scale);
    assert_eq!(record.has_labels, has_labels);
    assert_eq!(record.is_ordinal, is_ordinal);
    // codes equal the values and the labels are 1, 2, 3 in order
    assert_eq!(record.ints().unwrap(), &[1, 3, 2, 3, 1]);
}

#[test]
fn test_missing_codes_use_sentinel() {
    let data = survey();
    let mut ctx = context(&data);

    let buffer = ctx.marshal(&[ColumnSpec::actual("age (years)")], false).unwrap();
    let record = buffer.column("age (years)").unwrap();
    assert_eq!(record.labels, vec!["27", "34", "51", "62"]);
    assert_eq!(record.ints().unwrap(), &[2, 3, MISSING_CODE, 1, 4]);
}

#[test]
fn test_european_decimals_are_continuous() {
    let data = survey();
    let mut ctx = context(&data);

    let buffer = ctx.marshal(&[ColumnSpec::actual("weight")], false).unwrap();
    let values = buffer.column("weight").unwrap().doubles().unwrap();
    assert_eq!(values[0], 70.5);
    assert!(values[2].is_nan());
    assert_eq!(values[3], 64.25);
}

#[test]
fn test_quantized_fallback() {
    let data = imstat_data::DataSet::new(vec![imstat_data::Column::continuous(
        "x",
        vec![1.0001, 1.0004, 2.5],
    )])
    .unwrap()
    .into_shared();
    let mut ctx = context(&data);

    let buffer = ctx
        .marshal(&[ColumnSpec::new("x", ColumnType::Nominal)], false)
        .unwrap();
    let record = buffer.column("x").unwrap();
    assert_eq!(record.labels, vec!["1", "2.5"]);
    assert_eq!(record.ints().unwrap(), &[1, 1, 2]);
}

// === Names ===

#[test]
fn test_full_dataset_uses_encoded_names() {
    let data = survey();
    let mut ctx = context(&data);

    let names: Vec<String> = ctx
        .read_full_dataset(false)
        .unwrap()
        .columns()
        .iter()
        .map(|r| r.name.clone())
        .collect();

    assert_eq!(names.len(), 4);
    for (name, original) in names.iter().zip(["age (years)", "weight", "smoker?", "rating"]) {
        assert!(name.starts_with("imstatColumn_"));
        assert_eq!(ctx.decode_name(name), original);
    }
    assert_eq!(ctx.column_names().unwrap(), names);
}

#[test]
fn test_dataset_for_filtering_only_reads_given_columns() {
    let data = survey();
    data.write()
        .unwrap()
        .set_script_mask(vec![true, false, false, false, false])
        .unwrap();
    let mut ctx = context(&data);

    let buffer = ctx.read_dataset_for_filtering(&["rating"]).unwrap();
    assert_eq!(buffer.columns().len(), 1);
    assert_eq!(buffer.row_count(), 5);
    let id = buffer.columns()[0].name.clone();
    assert_eq!(ctx.decode_name(&id), "rating");
}

#[test]
fn test_unknown_column() {
    let data = small_dataset();
    let mut ctx = context(&data);
    let result = ctx.marshal(&[ColumnSpec::actual("nope")], false);
    assert_eq!(result.unwrap_err(), BridgeError::ColumnNotFound("nope".to_string()));
}

#[test]
fn test_no_dataset() {
    let provider: Option<imstat_data::SharedDataSet> = None;
    let mut ctx = imstat_bridge::BridgeContext::new(
        Box::new(provider),
        Box::new(imstat_script::NativeRuntime::new()),
    );
    assert!(matches!(
        ctx.marshal(&[], false),
        Err(BridgeError::Precondition(_))
    ));
}

// === Buffer lifecycle ===

#[test]
fn test_release_and_remarshal() {
    let data = small_dataset();
    let mut ctx = context(&data);

    assert!(ctx.buffer().is_none());
    ctx.marshal(&[ColumnSpec::actual("score")], false).unwrap();
    assert!(ctx.buffer().is_some());

    ctx.marshal(&[ColumnSpec::actual("group")], false).unwrap();
    let buffer = ctx.buffer().unwrap();
    assert!(buffer.column("score").is_none());
    assert!(buffer.column("group").is_some());

    assert!(ctx.release());
    assert!(ctx.buffer().is_none());
    assert!(!ctx.release());

    // the context only holds the dataset through the provider
    assert_eq!(Arc::strong_count(&data), 2);
}

#[test]
fn test_describe_without_values() {
    let data = survey();
    let ctx = context(&data);

    let descriptions = ctx
        .describe(&[
            ColumnSpec::actual("smoker?"),
            ColumnSpec::new("weight", ColumnType::Ordinal),
        ])
        .unwrap();

    assert_eq!(descriptions[0].labels, vec!["no", "yes"]);
    assert!(!descriptions[0].is_scale);
    assert!(descriptions[1].is_ordinal);
    assert_eq!(descriptions[1].labels, vec!["64.25", "70.5", "82", "90"]);
    assert!(ctx.buffer().is_none());
}

#[test]
fn test_buffer_json() {
    let data = small_dataset();
    let mut ctx = context(&data);
    let json = ctx
        .marshal(&[ColumnSpec::actual("score")], false)
        .unwrap()
        .to_json()
        .unwrap();
    let parsed = imstat_bridge::ExchangeBuffer::from_json(&json).unwrap();
    assert_eq!(parsed.row_index(), &[1, 2, 3]);
}
