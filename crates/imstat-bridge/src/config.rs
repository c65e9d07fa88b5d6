//! Configuration for imstat-bridge
//!
//! Names and tokens the bridge uses when it talks to the script runtime.

use imstat_script::is_identifier_char;
use serde::{Deserialize, Serialize};

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Name the dataset view is attached under while a filter runs
    pub data_name: String,
    /// Read-only script variable holding the row count
    pub row_count_name: String,
    /// Filter expression that selects every row without running a script
    pub match_all_token: String,
    /// Prefix of encoded column identifiers
    pub encoded_prefix: String,
    /// Label emitted in place of an empty label list
    pub empty_label_placeholder: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_name: "data".to_string(),
            row_count_name: "rowcount".to_string(),
            match_all_token: "*".to_string(),
            encoded_prefix: "imstatColumn_".to_string(),
            empty_label_placeholder: ".".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    #[cfg(feature = "toml-config")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serialize configuration to TOML
    #[cfg(feature = "toml-config")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load configuration from a JSON string
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("data_name", &self.data_name),
            ("row_count_name", &self.row_count_name),
            ("encoded_prefix", &self.encoded_prefix),
        ] {
            if value.is_empty() {
                return Err(ConfigError::MissingField(field.to_string()));
            }
            if !is_identifier(value) {
                return Err(ConfigError::InvalidIdentifier(format!(
                    "{} = '{}'",
                    field, value
                )));
            }
        }

        if self.data_name == self.row_count_name {
            return Err(ConfigError::InvalidIdentifier(
                "data_name and row_count_name must differ".to_string(),
            ));
        }

        if self.match_all_token.trim().is_empty() {
            return Err(ConfigError::MissingField("match_all_token".to_string()));
        }

        if self.empty_label_placeholder.is_empty() {
            return Err(ConfigError::MissingField(
                "empty_label_placeholder".to_string(),
            ));
        }

        Ok(())
    }
}

/// Script identifier: a letter or `.` followed by identifier characters
fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '.' => chars.all(is_identifier_char),
        _ => false,
    }
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Value cannot be used as a script identifier
    InvalidIdentifier(String),
    /// Required field is empty
    MissingField(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidIdentifier(msg) => write!(f, "Invalid identifier: {}", msg),
            ConfigError::MissingField(msg) => write!(f, "Missing field: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
