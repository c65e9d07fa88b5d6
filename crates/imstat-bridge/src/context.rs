//! Bridge context
//!
//! Everything the bridge keeps between calls lives here: the dataset
//! provider, the script runtime, the name encoding table and the exchange
//! buffer slot. Operations that touch the slot or the runtime take
//! `&mut self`, so the bridge cannot be re-entered while one is running.

use crate::config::BridgeConfig;
use crate::encoder::{NameEncoder, NameEncoding};
use crate::error::{BridgeError, Result};
use crate::exchange::BufferSlot;
use imstat_data::{
    coerce_column, Column, ColumnType, DataError, DataSet, DatasetProvider, LabelDictionary,
    SharedDataSet, MISSING_CODE,
};
use imstat_script::ScriptRuntime;
use std::sync::RwLockWriteGuard;
use tracing::{debug, info};

/// State shared by the exchange, filter and write-back operations
pub struct BridgeContext {
    pub(crate) provider: Box<dyn DatasetProvider>,
    pub(crate) runtime: Box<dyn ScriptRuntime>,
    pub(crate) encoding: NameEncoding,
    pub(crate) slot: BufferSlot,
    pub(crate) config: BridgeConfig,
}

impl BridgeContext {
    /// Create a context with the default configuration
    pub fn new(provider: Box<dyn DatasetProvider>, runtime: Box<dyn ScriptRuntime>) -> Self {
        Self::with_config(provider, runtime, BridgeConfig::default())
    }

    pub fn with_config(
        provider: Box<dyn DatasetProvider>,
        runtime: Box<dyn ScriptRuntime>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            provider,
            runtime,
            encoding: NameEncoding::new(config.encoded_prefix.clone()),
            slot: BufferSlot::default(),
            config,
        }
    }

    /// Install an encoder that takes priority for the names it claims
    pub fn with_extra_encoder(mut self, extra: Box<dyn NameEncoder>) -> Self {
        self.encoding.set_extra(Some(extra));
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn encoding(&self) -> &NameEncoding {
        &self.encoding
    }

    pub fn runtime(&self) -> &dyn ScriptRuntime {
        self.runtime.as_ref()
    }

    pub fn runtime_mut(&mut self) -> &mut dyn ScriptRuntime {
        self.runtime.as_mut()
    }

    /// The current dataset; resolved again on every call
    pub(crate) fn dataset(&self) -> Result<SharedDataSet> {
        self.provider
            .current_dataset()
            .ok_or_else(|| BridgeError::Precondition("No dataset loaded".to_string()))
    }

    // Name encoding

    /// Identifier scripts use for `name`
    pub fn encode_name(&mut self, name: &str) -> String {
        self.encoding.encode(name)
    }

    /// Original name of `id`; unknown identifiers come back unchanged
    pub fn decode_name(&self, id: &str) -> String {
        self.encoding.decode(id)
    }

    /// Replace every known column name in `text` by its identifier
    pub fn encode_all(&self, text: &str) -> String {
        self.encoding.encode_all(text)
    }

    /// Replace every known identifier in `text` by its column name
    pub fn decode_all(&self, text: &str) -> String {
        self.encoding.decode_all(text)
    }

    /// Register all current column names with the encoder
    pub(crate) fn register_columns(&mut self, data: &DataSet) {
        self.encoding.register_all(data.column_names());
    }

    // Column write-back

    /// Type of the column behind `encoded`; `Unknown` if the identifier was
    /// never produced or the column is gone
    pub fn column_type(&self, encoded: &str) -> Result<ColumnType> {
        if !self.encoding.should_decode(encoded) {
            return Ok(ColumnType::Unknown);
        }
        let name = self.encoding.decode(encoded);
        let dataset = self.dataset()?;
        let data = dataset.read().map_err(|_| BridgeError::Poisoned)?;
        Ok(data
            .column(&name)
            .map(Column::column_type)
            .unwrap_or(ColumnType::Unknown))
    }

    /// Append an empty nominal column and return its encoded name
    pub fn create_column(&mut self, name: &str) -> Result<String> {
        let dataset = self.dataset()?;
        let created = {
            let mut data = write(&dataset)?;
            let unique = data.unique_column_name(name);
            let column = Column::empty(unique.clone(), data.row_count());
            data.add_column(column)?;
            unique
        };
        info!(column = %created, "created column");
        Ok(self.encoding.encode(&created))
    }

    /// Store continuous values in the column behind `encoded`
    pub fn set_column_as_scale(&mut self, encoded: &str, values: &[f64]) -> Result<()> {
        self.write_back(encoded, |name| Ok(Column::continuous(name, values.to_vec())))
    }

    /// Store ordinal codes; `levels[i]` labels code `i + 1`
    pub fn set_column_as_ordinal(
        &mut self,
        encoded: &str,
        codes: &[i32],
        levels: &[String],
    ) -> Result<()> {
        self.write_back(encoded, |name| {
            coded_from_levels(name, ColumnType::Ordinal, codes, levels)
        })
    }

    /// Store nominal codes; `levels[i]` labels code `i + 1`
    pub fn set_column_as_nominal(
        &mut self,
        encoded: &str,
        codes: &[i32],
        levels: &[String],
    ) -> Result<()> {
        self.write_back(encoded, |name| {
            coded_from_levels(name, ColumnType::Nominal, codes, levels)
        })
    }

    /// Store text values, coded like imported text
    pub fn set_column_as_nominal_text(&mut self, encoded: &str, values: &[String]) -> Result<()> {
        self.write_back(encoded, |name| {
            Ok(coerce_column(name, values, Some(ColumnType::NominalText)))
        })
    }

    fn write_back<F>(&mut self, encoded: &str, build: F) -> Result<()>
    where
        F: FnOnce(&str) -> std::result::Result<Column, DataError>,
    {
        let name = self.encoding.decode(encoded);
        let dataset = self.dataset()?;
        let mut data = write(&dataset)?;

        if data.column(&name).is_none() {
            return Err(BridgeError::ColumnNotFound(name));
        }
        let column = build(&name)?;
        if column.len() != data.row_count() {
            return Err(DataError::LengthMismatch {
                expected: data.row_count(),
                actual: column.len(),
            }
            .into());
        }

        debug!(column = %name, column_type = %column.column_type(), "writing column back");
        data.replace_column(&name, column)?;
        Ok(())
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("encoding", &self.encoding)
            .field("slot", &self.slot.is_populated())
            .field("config", &self.config)
            .finish()
    }
}

fn write(dataset: &SharedDataSet) -> Result<RwLockWriteGuard<'_, DataSet>> {
    dataset.write().map_err(|_| BridgeError::Poisoned)
}

/// Coded column from 1-based level indices
fn coded_from_levels(
    name: &str,
    column_type: ColumnType,
    codes: &[i32],
    levels: &[String],
) -> std::result::Result<Column, DataError> {
    let labels = LabelDictionary::from_pairs(
        levels
            .iter()
            .enumerate()
            .map(|(i, level)| (i as i32 + 1, level.as_str())),
    )?;
    let values = codes
        .iter()
        .map(|c| if *c == MISSING_CODE { None } else { Some(*c) })
        .collect();
    Column::coded(name, column_type, values, labels)
}
