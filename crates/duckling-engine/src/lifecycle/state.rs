//! Lifecycle states and the observable snapshot

use crate::catalog::CatalogSnapshot;
use duckling_core::errors::DucklingError;
use std::fmt;

/// Transaction sub-machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Begin,
    WithinTransaction,
    Execute,
    Commit,
    Rollback,
    Error,
    End,
}

impl TransactionState {
    pub fn name(&self) -> &'static str {
        match self {
            TransactionState::Begin => "Transaction.Begin",
            TransactionState::WithinTransaction => "Transaction.WithinTransaction",
            TransactionState::Execute => "Transaction.Execute",
            TransactionState::Commit => "Transaction.Commit",
            TransactionState::Rollback => "Transaction.Rollback",
            TransactionState::Error => "Transaction.Error",
            TransactionState::End => "Transaction.End",
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Configured,
    Initializing,
    Connected,
    QueryOneShot,
    Transaction(TransactionState),
    Disconnected,
    Error,
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "Idle",
            LifecycleState::Configured => "Configured",
            LifecycleState::Initializing => "Initializing",
            LifecycleState::Connected => "Connected",
            LifecycleState::QueryOneShot => "QueryOneShot",
            LifecycleState::Transaction(tx) => tx.name(),
            LifecycleState::Disconnected => "Disconnected",
            LifecycleState::Error => "Error",
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self, LifecycleState::Transaction(_))
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the controller task publishes after every step
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct ControllerView {
    pub state: LifecycleState,
    pub engine_version: Option<String>,
    pub has_transaction: bool,
    pub last_error: Option<DucklingError>,
}

/// Read-only view of the controller with the catalog's own snapshot nested
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    pub engine_version: Option<String>,
    /// A dedicated transaction connection is open
    pub has_transaction: bool,
    pub last_error: Option<DucklingError>,
    pub catalog: CatalogSnapshot,
}

impl LifecycleSnapshot {
    pub(crate) fn compose(view: ControllerView, catalog: CatalogSnapshot) -> Self {
        Self {
            state: view.state,
            engine_version: view.engine_version,
            has_transaction: view.has_transaction,
            last_error: view.last_error,
            catalog,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LifecycleState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_names_are_qualified() {
        let state = LifecycleState::Transaction(TransactionState::WithinTransaction);
        assert_eq!(state.to_string(), "Transaction.WithinTransaction");
        assert!(state.in_transaction());
        assert!(!LifecycleState::Connected.in_transaction());
    }

    #[test]
    fn test_default_view_is_idle() {
        let view = ControllerView::default();
        assert_eq!(view.state, LifecycleState::Idle);
        assert!(view.engine_version.is_none());
        assert!(!view.has_transaction);
    }
}
