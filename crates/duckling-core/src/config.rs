//! Session configuration
//!
//! Engine init parameters and table definitions arrive as plain structured
//! data. Everything is validated before either state machine changes state.

use crate::errors::{DucklingError, Result};
use crate::model::TableDefinition;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Engine-side log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Debug,
    Info,
    #[default]
    Warning,
    Error,
}

/// Options passed to `EngineInstance::open`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineOpenConfig {
    /// Database location; in-memory when absent
    #[serde(default)]
    pub path: Option<String>,
    /// Engine settings applied right after opening
    #[serde(default)]
    pub pragmas: BTreeMap<String, String>,
}

/// Parameters for instantiating the engine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineInitParams {
    #[serde(default)]
    pub log_level: LogLevel,
    /// Skip `open` entirely when absent
    #[serde(default)]
    pub open: Option<EngineOpenConfig>,
}

/// Everything `CONFIGURE` needs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default)]
    pub engine: EngineInitParams,
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

impl SessionConfig {
    pub fn new(engine: EngineInitParams, tables: Vec<TableDefinition>) -> Self {
        Self { engine, tables }
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// `Configuration` when the document is malformed or fails validation.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: SessionConfig =
            toml::from_str(input).map_err(|e| DucklingError::Configuration {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    ///
    /// # Errors
    ///
    /// `Configuration` when the document is malformed or fails validation.
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_json::from_str(input).map_err(|e| DucklingError::Configuration {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// See [`validate_table_definitions`].
    pub fn validate(&self) -> Result<()> {
        if let Some(open) = &self.engine.open {
            if matches!(&open.path, Some(p) if p.trim().is_empty()) {
                return Err(DucklingError::Configuration {
                    reason: "engine open path must not be blank".to_string(),
                });
            }
        }
        validate_table_definitions(&self.tables)
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Structural validation of table definitions
///
/// # Errors
///
/// `Configuration` for an empty or non-identifier schema/name, a duplicate
/// name, or a versioned table retaining zero versions.
pub fn validate_table_definitions(definitions: &[TableDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for def in definitions {
        if !is_identifier(&def.name) {
            return Err(DucklingError::Configuration {
                reason: format!("invalid table name '{}'", def.name),
            });
        }
        if !is_identifier(&def.schema) {
            return Err(DucklingError::Configuration {
                reason: format!("invalid schema '{}' for table {}", def.schema, def.name),
            });
        }
        if def.is_versioned && def.max_versions == 0 {
            return Err(DucklingError::Configuration {
                reason: format!("versioned table {} must retain at least one version", def.name),
            });
        }
        if !seen.insert(def.name.as_str()) {
            return Err(DucklingError::Configuration {
                reason: format!("duplicate table name '{}'", def.name),
            });
        }
    }
    Ok(())
}
