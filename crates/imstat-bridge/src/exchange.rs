//! Exchange buffer protocol
//!
//! A dataset crosses into the script runtime as an [`ExchangeBuffer`]: one
//! [`ExchangeRecord`] per requested column, followed by a record holding the
//! 1-based numbers of the rows that made it through the filter.
//!
//! The buffer lives in a [`BufferSlot`] owned by the bridge context. Building
//! a new buffer releases the previous one, and the reference handed out by
//! [`BridgeContext::marshal`] borrows the slot, so it cannot outlive the next
//! marshal or release.
//!
//! # Type compatibility
//!
//! | requested  | continuous       | nominal / ordinal     | nominal text          |
//! |------------|------------------|-----------------------|-----------------------|
//! | continuous | doubles          | raw codes, no labels  | label indices, labels |
//! | coded      | quantized labels | label indices, labels | label indices, labels |

use crate::context::BridgeContext;
use crate::error::{BridgeError, Result};
use imstat_data::{format_double, Column, ColumnType, ColumnValues, DataSet, MISSING_CODE};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Name of the trailing row-index record
pub const ROW_INDEX_NAME: &str = ".rowIndex";

/// Values of one exchanged column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    /// Continuous values, NaN for missing (serialized as `null`)
    Doubles(#[serde(deserialize_with = "nan_from_null")] Vec<f64>),
    /// Codes or label indices, `i32::MIN` for missing
    Ints(Vec<i32>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match self {
            Payload::Doubles(v) => v.len(),
            Payload::Ints(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn nan_from_null<'de, D>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// One column of an exchange buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    /// Name as requested, normally the encoded identifier
    pub name: String,
    pub is_scale: bool,
    pub has_labels: bool,
    pub is_ordinal: bool,
    pub row_count: usize,
    pub payload: Payload,
    /// Label texts; `Ints` payloads index into them from 1
    pub labels: Vec<String>,
}

impl ExchangeRecord {
    pub fn doubles(&self) -> Option<&[f64]> {
        match &self.payload {
            Payload::Doubles(v) => Some(v),
            Payload::Ints(_) => None,
        }
    }

    pub fn ints(&self) -> Option<&[i32]> {
        match &self.payload {
            Payload::Ints(v) => Some(v),
            Payload::Doubles(_) => None,
        }
    }
}

/// Columns plus the trailing row-index record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeBuffer {
    records: Vec<ExchangeRecord>,
}

impl ExchangeBuffer {
    fn new(mut columns: Vec<ExchangeRecord>, row_index: Vec<i32>) -> Self {
        columns.push(ExchangeRecord {
            name: ROW_INDEX_NAME.to_string(),
            is_scale: false,
            has_labels: false,
            is_ordinal: false,
            row_count: row_index.len(),
            payload: Payload::Ints(row_index),
            labels: Vec::new(),
        });
        Self { records: columns }
    }

    /// Every record, row index last
    pub fn records(&self) -> &[ExchangeRecord] {
        &self.records
    }

    /// The column records without the row index
    pub fn columns(&self) -> &[ExchangeRecord] {
        let n = self.records.len().saturating_sub(1);
        &self.records[..n]
    }

    pub fn column(&self, name: &str) -> Option<&ExchangeRecord> {
        self.columns().iter().find(|r| r.name == name)
    }

    /// 1-based numbers of the exchanged rows
    pub fn row_index(&self) -> &[i32] {
        self.records.last().and_then(|r| r.ints()).unwrap_or(&[])
    }

    /// Number of exchanged rows
    pub fn row_count(&self) -> usize {
        self.row_index().len()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Holder of the single live buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BufferSlot {
    buffer: Option<ExchangeBuffer>,
}

impl BufferSlot {
    /// Store `buffer`, dropping whatever was there
    pub fn fill(&mut self, buffer: ExchangeBuffer) -> &ExchangeBuffer {
        self.buffer.insert(buffer)
    }

    /// Drop the buffer. Returns whether there was one.
    pub fn release(&mut self) -> bool {
        self.buffer.take().is_some()
    }

    pub fn get(&self) -> Option<&ExchangeBuffer> {
        self.buffer.as_ref()
    }

    pub fn is_populated(&self) -> bool {
        self.buffer.is_some()
    }
}

/// A column to exchange and the type it should arrive as.
/// [`ColumnType::Unknown`] means "as it is".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub requested: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, requested: ColumnType) -> Self {
        Self {
            name: name.into(),
            requested,
        }
    }

    /// Request the column at its actual type
    pub fn actual(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Unknown)
    }
}

/// Type flags and labels of an exchanged column, without its values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    pub is_scale: bool,
    pub has_labels: bool,
    pub is_ordinal: bool,
    pub labels: Vec<String>,
}

/// How a column travels for a requested type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Doubles,
    RawCodes,
    LabelIndices,
    Quantized,
}

impl Conversion {
    fn select(column: &Column, requested: ColumnType) -> Self {
        let actual = column.column_type();
        let requested = if requested == ColumnType::Unknown {
            actual
        } else {
            requested
        };
        let continuous = matches!(column.values(), ColumnValues::Continuous(_));

        match (requested, continuous) {
            (ColumnType::Continuous, true) => Conversion::Doubles,
            (ColumnType::Continuous, false) if actual == ColumnType::NominalText => {
                Conversion::LabelIndices
            }
            (ColumnType::Continuous, false) => Conversion::RawCodes,
            (_, true) => Conversion::Quantized,
            (_, false) => Conversion::LabelIndices,
        }
    }

    fn is_scale(&self) -> bool {
        matches!(self, Conversion::Doubles)
    }

    fn has_labels(&self) -> bool {
        matches!(self, Conversion::LabelIndices | Conversion::Quantized)
    }
}

/// Quantization bucket of a continuous value; infinities get their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    NegInf,
    Finite(i64),
    PosInf,
}

impl Bucket {
    fn of(value: f64) -> Option<Self> {
        if value.is_nan() {
            None
        } else if value == f64::INFINITY {
            Some(Bucket::PosInf)
        } else if value == f64::NEG_INFINITY {
            Some(Bucket::NegInf)
        } else {
            Some(Bucket::Finite((value * 1000.0).trunc() as i64))
        }
    }

    fn label(&self) -> String {
        match self {
            Bucket::NegInf => "-Inf".to_string(),
            Bucket::PosInf => "Inf".to_string(),
            Bucket::Finite(b) => format_double(*b as f64 / 1000.0),
        }
    }
}

/// Ascending buckets of all values, mapped to dense 1-based indices
fn quantize(values: &[f64]) -> (BTreeMap<Bucket, i32>, Vec<String>) {
    let buckets: BTreeSet<Bucket> = values.iter().filter_map(|v| Bucket::of(*v)).collect();
    let labels = buckets.iter().map(Bucket::label).collect();
    let index = buckets
        .into_iter()
        .enumerate()
        .map(|(i, b)| (b, i as i32 + 1))
        .collect();
    (index, labels)
}

/// Values of rows kept by `keep`, all rows without a mask
fn kept<'a, T: Copy + 'a>(
    values: &'a [T],
    keep: Option<&'a [bool]>,
) -> impl Iterator<Item = T> + 'a {
    values
        .iter()
        .enumerate()
        .filter(move |(row, _)| keep.map_or(true, |k| k.get(*row).copied().unwrap_or(false)))
        .map(|(_, v)| *v)
}

fn with_placeholder(labels: Vec<String>, placeholder: &str) -> Vec<String> {
    if labels.is_empty() {
        vec![placeholder.to_string()]
    } else {
        labels
    }
}

fn resolved(requested: ColumnType, column: &Column) -> ColumnType {
    match requested {
        ColumnType::Unknown => column.column_type(),
        other => other,
    }
}

/// Only label indices carry the ordinal flag in a record; quantized
/// values never do
fn record_is_ordinal(conversion: Conversion, requested: ColumnType, column: &Column) -> bool {
    conversion == Conversion::LabelIndices && resolved(requested, column) == ColumnType::Ordinal
}

/// A description requested as scale reports the stored ordinality
fn description_is_ordinal(requested: ColumnType, column: &Column) -> bool {
    match resolved(requested, column) {
        ColumnType::Continuous => column.column_type() == ColumnType::Ordinal,
        other => other == ColumnType::Ordinal,
    }
}

fn build_record(
    name: String,
    column: &Column,
    requested: ColumnType,
    keep: Option<&[bool]>,
    rows: usize,
    placeholder: &str,
) -> ExchangeRecord {
    let conversion = Conversion::select(column, requested);
    let no_codes: &[Option<i32>] = &[];
    let no_doubles: &[f64] = &[];

    let (payload, labels) = match conversion {
        Conversion::Doubles => {
            let values = column.doubles().unwrap_or(no_doubles);
            (Payload::Doubles(kept(values, keep).collect()), Vec::new())
        }
        Conversion::RawCodes => {
            let codes = column.codes().unwrap_or(no_codes);
            let ints = kept(codes, keep).map(|c| c.unwrap_or(MISSING_CODE)).collect();
            (Payload::Ints(ints), Vec::new())
        }
        Conversion::LabelIndices => {
            let dense = column.labels().dense_indices();
            let codes = column.codes().unwrap_or(no_codes);
            let ints = kept(codes, keep)
                .map(|c| c.and_then(|c| dense.get(&c).copied()).unwrap_or(MISSING_CODE))
                .collect();
            (Payload::Ints(ints), column.labels().texts())
        }
        Conversion::Quantized => {
            let values = column.doubles().unwrap_or(no_doubles);
            let (index, labels) = quantize(values);
            let ints = kept(values, keep)
                .map(|v| {
                    Bucket::of(v)
                        .and_then(|b| index.get(&b).copied())
                        .unwrap_or(MISSING_CODE)
                })
                .collect();
            (Payload::Ints(ints), labels)
        }
    };

    let has_labels = conversion.has_labels();
    ExchangeRecord {
        name,
        is_scale: conversion.is_scale(),
        has_labels,
        is_ordinal: record_is_ordinal(conversion, requested, column),
        row_count: rows,
        payload,
        labels: if has_labels {
            with_placeholder(labels, placeholder)
        } else {
            labels
        },
    }
}

fn describe_column(
    name: String,
    column: &Column,
    requested: ColumnType,
    placeholder: &str,
) -> ColumnDescription {
    let conversion = Conversion::select(column, requested);
    let labels = match conversion {
        Conversion::Doubles | Conversion::RawCodes => Vec::new(),
        Conversion::LabelIndices => with_placeholder(column.labels().texts(), placeholder),
        Conversion::Quantized => {
            let (_, labels) = quantize(column.doubles().unwrap_or(&[]));
            with_placeholder(labels, placeholder)
        }
    };
    let has_labels = conversion.has_labels();
    ColumnDescription {
        name,
        is_scale: conversion.is_scale(),
        has_labels,
        is_ordinal: description_is_ordinal(requested, column),
        labels,
    }
}

/// 1-based numbers of the rows kept by `keep`
fn row_index(rows: usize, keep: Option<&[bool]>) -> Vec<i32> {
    let numbers: Vec<i32> = (1..=rows as i32).collect();
    kept(&numbers, keep).collect()
}

/// Build a buffer from resolved `(record name, column, requested type)`
/// triples
fn build_buffer(
    data: &DataSet,
    columns: &[(String, &Column, ColumnType)],
    obey_filter: bool,
    placeholder: &str,
) -> ExchangeBuffer {
    let mask = obey_filter.then(|| data.filter_mask());
    let keep = mask.as_deref();
    let index = row_index(data.row_count(), keep);
    let rows = index.len();

    let records = columns
        .iter()
        .map(|(name, column, requested)| {
            build_record(name.clone(), column, *requested, keep, rows, placeholder)
        })
        .collect();

    ExchangeBuffer::new(records, index)
}

impl BridgeContext {
    /// Marshal the requested columns into the buffer slot. Spec names may be
    /// encoded identifiers or original names.
    pub fn marshal(&mut self, specs: &[ColumnSpec], obey_filter: bool) -> Result<&ExchangeBuffer> {
        let dataset = self.dataset()?;
        if self.slot.release() {
            info!("released previous exchange buffer");
        }

        let buffer = {
            let data = dataset.read().map_err(|_| BridgeError::Poisoned)?;
            let mut resolved = Vec::with_capacity(specs.len());
            for spec in specs {
                let original = self.encoding.decode(&spec.name);
                let column = data
                    .column(&original)
                    .ok_or_else(|| BridgeError::ColumnNotFound(original.clone()))?;
                resolved.push((spec.name.clone(), column, spec.requested));
            }
            build_buffer(
                &data,
                &resolved,
                obey_filter,
                &self.config.empty_label_placeholder,
            )
        };

        info!(
            columns = specs.len(),
            rows = buffer.row_count(),
            obey_filter,
            "marshalled exchange buffer"
        );
        Ok(self.slot.fill(buffer))
    }

    /// Drop the live buffer, if any
    pub fn release(&mut self) -> bool {
        let released = self.slot.release();
        if released {
            info!("released exchange buffer");
        }
        released
    }

    /// The live buffer, if any
    pub fn buffer(&self) -> Option<&ExchangeBuffer> {
        self.slot.get()
    }

    /// Marshal every column at its actual type, under its encoded name
    pub fn read_full_dataset(&mut self, obey_filter: bool) -> Result<&ExchangeBuffer> {
        let specs: Vec<ColumnSpec> = self
            .column_names()?
            .into_iter()
            .map(ColumnSpec::actual)
            .collect();
        self.marshal(&specs, obey_filter)
    }

    /// Marshal only `names` (original names), unfiltered
    pub fn read_dataset_for_filtering<S: AsRef<str>>(
        &mut self,
        names: &[S],
    ) -> Result<&ExchangeBuffer> {
        let specs: Vec<ColumnSpec> = names
            .iter()
            .map(|n| ColumnSpec::actual(self.encoding.encode(n.as_ref())))
            .collect();
        debug!(columns = specs.len(), "reading dataset for filtering");
        self.marshal(&specs, false)
    }

    /// Type flags and labels the requested columns would be exchanged with
    pub fn describe(&self, specs: &[ColumnSpec]) -> Result<Vec<ColumnDescription>> {
        let dataset = self.dataset()?;
        let data = dataset.read().map_err(|_| BridgeError::Poisoned)?;

        specs
            .iter()
            .map(|spec| {
                let original = self.encoding.decode(&spec.name);
                let column = data
                    .column(&original)
                    .ok_or_else(|| BridgeError::ColumnNotFound(original.clone()))?;
                Ok(describe_column(
                    spec.name.clone(),
                    column,
                    spec.requested,
                    &self.config.empty_label_placeholder,
                ))
            })
            .collect()
    }

    /// Encoded names of all columns, in dataset order
    pub fn column_names(&mut self) -> Result<Vec<String>> {
        let dataset = self.dataset()?;
        let names: Vec<String> = {
            let data = dataset.read().map_err(|_| BridgeError::Poisoned)?;
            data.column_names().into_iter().map(String::from).collect()
        };
        Ok(names.iter().map(|n| self.encoding.encode(n)).collect())
    }
}
