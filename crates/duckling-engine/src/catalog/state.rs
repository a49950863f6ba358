//! Catalog states and the observable snapshot

use duckling_core::errors::DucklingError;
use duckling_core::model::{LoadedTableEntry, TableDefinition};
use std::fmt;

/// Catalog orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogState {
    Idle,
    Configured,
    Connected,
    LoadingTable,
    PruningVersions,
    DroppingTable,
    Error,
}

impl CatalogState {
    pub fn name(&self) -> &'static str {
        match self {
            CatalogState::Idle => "Idle",
            CatalogState::Configured => "Configured",
            CatalogState::Connected => "Connected",
            CatalogState::LoadingTable => "LoadingTable",
            CatalogState::PruningVersions => "PruningVersions",
            CatalogState::DroppingTable => "DroppingTable",
            CatalogState::Error => "Error",
        }
    }

    /// A structural mutation is in flight
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            CatalogState::LoadingTable | CatalogState::PruningVersions | CatalogState::DroppingTable
        )
    }

    /// States `Disconnect` is accepted from
    pub fn accepts_disconnect(&self) -> bool {
        matches!(self, CatalogState::Connected | CatalogState::Error) || self.is_busy()
    }
}

impl fmt::Display for CatalogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only view of the catalog, republished after every command
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSnapshot {
    pub state: CatalogState,
    pub table_definitions: Vec<TableDefinition>,
    /// Newest first
    pub loaded_versions: Vec<LoadedTableEntry>,
    /// Id the next load will receive
    pub next_table_id: u64,
    /// Mutations waiting behind the in-flight one
    pub queue_len: usize,
    /// Table the in-flight mutation targets
    pub current_table: Option<String>,
    pub subscription_ids: Vec<String>,
    pub last_error: Option<DucklingError>,
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self {
            state: CatalogState::Idle,
            table_definitions: Vec::new(),
            loaded_versions: Vec::new(),
            next_table_id: 1,
            queue_len: 0,
            current_table: None,
            subscription_ids: Vec::new(),
            last_error: None,
        }
    }
}

impl CatalogSnapshot {
    /// No mutation in flight and none able to start
    ///
    /// Queued work only runs from `Connected`; a queue held in `Error` or
    /// `Configured` stays parked until the catalog reconnects.
    pub fn is_settled(&self) -> bool {
        !self.state.is_busy() && (self.queue_len == 0 || self.state != CatalogState::Connected)
    }

    /// Loaded entries of one logical table, newest first
    pub fn versions_of<'a>(
        &'a self,
        table_spec_name: &'a str,
    ) -> impl Iterator<Item = &'a LoadedTableEntry> + 'a {
        self.loaded_versions
            .iter()
            .filter(move |e| e.table_spec_name == table_spec_name)
    }
}
