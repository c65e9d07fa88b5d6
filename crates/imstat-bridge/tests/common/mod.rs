//! Shared test datasets

use imstat_bridge::BridgeContext;
use imstat_data::{coerce_column, Column, DataSet, SharedDataSet};
use imstat_script::NativeRuntime;

/// Route bridge logs to the test output
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("imstat_bridge=debug")
        .with_test_writer()
        .try_init();
}

/// 3 rows × 2 columns: a continuous score and a text group
pub fn small_dataset() -> SharedDataSet {
    DataSet::new(vec![
        Column::continuous("score", vec![1.5, f64::NAN, 3.25]),
        coerce_column("group", &["b", "a", "b"], None),
    ])
    .unwrap()
    .into_shared()
}

/// A survey with awkward column names
#[allow(dead_code)]
pub fn survey() -> SharedDataSet {
    DataSet::new(vec![
        coerce_column("age (years)", &["34", "51", "", "27", "62"], None),
        coerce_column("weight", &["70,5", "82", "NaN", "64,25", "90"], None),
        coerce_column("smoker?", &["yes", "no", "no", "yes", ""], None),
        coerce_column("rating", &["1", "3", "2", "3", "1"], None),
    ])
    .unwrap()
    .into_shared()
}

pub fn context(data: &SharedDataSet) -> BridgeContext {
    init_tracing();
    BridgeContext::new(Box::new(data.clone()), Box::new(NativeRuntime::new()))
}
