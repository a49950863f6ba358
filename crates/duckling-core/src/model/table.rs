use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_max_versions() -> u32 {
    1
}

fn default_schema() -> String {
    "main".to_string()
}

/// Static description of a logical table
///
/// Immutable for the life of a configured session; `name` is unique within
/// a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    #[serde(default)]
    pub is_versioned: bool,
    #[serde(default = "default_max_versions")]
    pub max_versions: u32,
}

impl TableDefinition {
    /// A table whose loads overwrite a single physical instance
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            is_versioned: false,
            max_versions: 1,
        }
    }

    /// A table whose loads create `name_<version>` instances, keeping at
    /// most `max_versions` of them
    pub fn versioned(schema: impl Into<String>, name: impl Into<String>, max_versions: u32) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            is_versioned: true,
            max_versions,
        }
    }

    /// Physical instance name for a given version
    ///
    /// `name` when not versioned, `name_<version>` otherwise.
    pub fn instance_name(&self, version_id: u64) -> String {
        if self.is_versioned {
            format!("{}_{}", self.name, version_id)
        } else {
            self.name.clone()
        }
    }

    /// Schema-qualified, quoted reference to a physical instance
    pub fn qualified_name(&self, instance_name: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(instance_name))
    }
}

/// Look up a definition by logical name
pub fn find_definition<'a>(
    definitions: &'a [TableDefinition],
    name: &str,
) -> Option<&'a TableDefinition> {
    definitions.iter().find(|d| d.name == name)
}

/// Quote an SQL identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// One physically materialised version of a logical table
///
/// Created by the loader on a successful insert and removed by the pruner;
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedTableEntry {
    pub table_spec_name: String,
    pub table_instance_name: String,
    pub table_version_id: u64,
    pub table_is_versioned: bool,
    pub loaded_epoch: DateTime<Utc>,
}

/// Retained versions of one logical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub table_spec_name: String,
    /// Highest first
    pub versions: Vec<u64>,
    pub latest_version: Option<u64>,
}

impl TableMetadata {
    /// Collect the retained versions of `table_spec_name`
    pub fn from_entries(table_spec_name: &str, entries: &[LoadedTableEntry]) -> Self {
        let mut versions: Vec<u64> = entries
            .iter()
            .filter(|e| e.table_spec_name == table_spec_name)
            .map(|e| e.table_version_id)
            .collect();
        versions.sort_unstable_by(|a, b| b.cmp(a));
        Self {
            table_spec_name: table_spec_name.to_string(),
            latest_version: versions.first().copied(),
            versions,
        }
    }
}
