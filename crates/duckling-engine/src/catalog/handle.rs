use super::actor::CatalogActor;
use super::command::{CatalogCommand, Reply};
use super::state::{CatalogSnapshot, CatalogState};
use duckling_core::engine::EngineRef;
use duckling_core::errors::{DucklingError, Result};
use duckling_core::model::{
    CatalogSubscription, LoadedTableEntry, PendingTableLoad, TableDefinition, TableMetadata,
};
use duckling_core_types::RequestId;
use tokio::sync::{mpsc, oneshot, watch};

/// Default bound of the catalog command channel
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

fn unavailable() -> DucklingError {
    DucklingError::ActorUnavailable {
        actor: "catalog".to_string(),
    }
}

/// Outstanding load that has been accepted into the queue
#[derive(Debug)]
pub struct LoadTicket {
    pub request_id: RequestId,
    rx: oneshot::Receiver<Result<LoadedTableEntry>>,
}

impl LoadTicket {
    pub(crate) fn new(
        request_id: RequestId,
        rx: oneshot::Receiver<Result<LoadedTableEntry>>,
    ) -> Self {
        Self { request_id, rx }
    }

    /// Wait for the load and its retention pass
    ///
    /// # Errors
    ///
    /// The load's own error, `Cancelled` when the catalog was disconnected
    /// or reset first, or `ActorUnavailable` when the catalog is gone.
    pub async fn wait(self) -> Result<LoadedTableEntry> {
        self.rx.await.map_err(|_| unavailable())?
    }
}

/// Cloneable client of a running catalog orchestrator
#[derive(Clone)]
pub struct CatalogHandle {
    commands: mpsc::Sender<CatalogCommand>,
    snapshots: watch::Receiver<CatalogSnapshot>,
}

impl CatalogHandle {
    /// Spawn the orchestrator on the current tokio runtime
    pub fn spawn() -> Self {
        Self::with_capacity(DEFAULT_COMMAND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (commands, rx) = mpsc::channel(capacity);
        let (snapshot_tx, snapshots) = watch::channel(CatalogSnapshot::default());
        tokio::spawn(CatalogActor::new(rx, snapshot_tx).run());
        Self {
            commands,
            snapshots,
        }
    }

    /// Deliver a fully formed command
    ///
    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn send(&self, command: CatalogCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| unavailable())
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> CatalogCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| unavailable())?
    }

    /// # Errors
    ///
    /// `Configuration` for invalid definitions, `InvalidTransition` outside `Idle`.
    pub async fn configure(&self, table_definitions: Vec<TableDefinition>) -> Result<()> {
        self.request(|reply| CatalogCommand::Configure {
            table_definitions,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Configured`.
    pub async fn connect(&self) -> Result<()> {
        self.request(|reply| CatalogCommand::Connect { reply }).await
    }

    /// Cancel outstanding mutations and return to `Configured`
    ///
    /// # Errors
    ///
    /// `InvalidTransition` from `Idle` or `Configured`.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| CatalogCommand::Disconnect { reply }).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` unless `Configured` or `Error`.
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| CatalogCommand::Reset { reply }).await
    }

    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn list_tables(&self) -> Result<Vec<LoadedTableEntry>> {
        self.request(|reply| CatalogCommand::ListTables { reply }).await
    }

    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn list_definitions(&self) -> Result<Vec<TableDefinition>> {
        self.request(|reply| CatalogCommand::ListDefinitions { reply }).await
    }

    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn table_metadata(&self, table_spec_name: &str) -> Result<TableMetadata> {
        let table_spec_name = table_spec_name.to_string();
        self.request(|reply| CatalogCommand::GetTableMetadata {
            table_spec_name,
            reply,
        })
        .await
    }

    /// Queue a load without waiting for it
    ///
    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn enqueue_load(
        &self,
        request: PendingTableLoad,
        engine: EngineRef,
    ) -> Result<LoadTicket> {
        let (reply, rx) = oneshot::channel();
        let request_id = request.request_id.clone();
        self.send(CatalogCommand::LoadTable {
            request,
            engine,
            reply,
        })
        .await?;
        Ok(LoadTicket::new(request_id, rx))
    }

    /// Queue a load and wait for it to complete
    ///
    /// # Errors
    ///
    /// See [`LoadTicket::wait`].
    pub async fn load_table(
        &self,
        request: PendingTableLoad,
        engine: EngineRef,
    ) -> Result<LoadedTableEntry> {
        self.enqueue_load(request, engine).await?.wait().await
    }

    /// # Errors
    ///
    /// `TableDefinitionNotFound` for an unknown name, `Drop` when the engine fails.
    pub async fn drop_table(&self, table_spec_name: &str, engine: EngineRef) -> Result<()> {
        let table_spec_name = table_spec_name.to_string();
        self.request(|reply| CatalogCommand::DropTable {
            table_spec_name,
            engine,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn subscribe(&self, subscription: CatalogSubscription) -> Result<()> {
        self.request(|reply| CatalogCommand::Subscribe {
            subscription,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<bool> {
        let subscription_id = subscription_id.to_string();
        self.request(|reply| CatalogCommand::Unsubscribe {
            subscription_id,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn force_notify(&self, subscription_id: &str) -> Result<bool> {
        let subscription_id = subscription_id.to_string();
        self.request(|reply| CatalogCommand::ForceNotify {
            subscription_id,
            reply,
        })
        .await
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> CatalogSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> CatalogState {
        self.snapshots.borrow().state
    }

    pub fn watch(&self) -> watch::Receiver<CatalogSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until no catalog mutation is running or about to run
    ///
    /// Commands sent before this call are applied first, so a load queued
    /// just ahead of it is waited for.
    ///
    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator has stopped.
    pub async fn wait_settled(&self) -> Result<CatalogSnapshot> {
        // Round trip through the command channel before reading snapshots
        self.list_tables().await?;
        self.wait_until(CatalogSnapshot::is_settled).await
    }

    /// Wait until a published snapshot satisfies `predicate`
    ///
    /// # Errors
    ///
    /// `ActorUnavailable` when the orchestrator stops first.
    pub async fn wait_until(
        &self,
        predicate: impl FnMut(&CatalogSnapshot) -> bool,
    ) -> Result<CatalogSnapshot> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx.wait_for(predicate).await.map_err(|_| unavailable())?;
        Ok(snapshot.clone())
    }
}
