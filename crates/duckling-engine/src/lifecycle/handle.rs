use super::actor::LifecycleActor;
use super::command::{LifecycleCommand, QueryOutput, QueryRequest};
use super::state::{ControllerView, LifecycleSnapshot, LifecycleState};
use crate::catalog::{CatalogHandle, CatalogRequest, LoadTicket, Reply, DEFAULT_COMMAND_CAPACITY};
use duckling_core::config::SessionConfig;
use duckling_core::engine::{EngineFactory, EngineHooks, ResultSet};
use duckling_core::errors::{DucklingError, Result};
use duckling_core::model::{
    CatalogSubscription, LoadedTableEntry, PendingTableLoad, TableDefinition, TableMetadata,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

fn unavailable() -> DucklingError {
    DucklingError::ActorUnavailable {
        actor: "lifecycle".to_string(),
    }
}

/// Client of one embedded database session
///
/// Spawns the lifecycle controller and its catalog orchestrator. Clones
/// share the same session.
#[derive(Clone)]
pub struct DatabaseHandle {
    commands: mpsc::Sender<LifecycleCommand>,
    view: watch::Receiver<ControllerView>,
    catalog: CatalogHandle,
}

impl DatabaseHandle {
    /// Spawn both actors on the current tokio runtime
    pub fn spawn(factory: Arc<dyn EngineFactory>) -> Self {
        let catalog = CatalogHandle::spawn();
        let (commands, rx) = mpsc::channel(DEFAULT_COMMAND_CAPACITY);
        let (view_tx, view) = watch::channel(ControllerView::default());
        tokio::spawn(LifecycleActor::new(factory, catalog.clone(), rx, view_tx).run());
        Self {
            commands,
            view,
            catalog,
        }
    }

    /// # Errors
    ///
    /// `ActorUnavailable` when the controller has stopped.
    pub async fn send(&self, command: LifecycleCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| unavailable())
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> LifecycleCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| unavailable())?
    }

    async fn catalog_request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> CatalogRequest,
    ) -> Result<T> {
        self.request(|reply| LifecycleCommand::Catalog(build(reply))).await
    }

    /// Store session parameters and configure the catalog
    ///
    /// # Errors
    ///
    /// `Configuration` when validation fails (state unchanged),
    /// `InvalidTransition` outside `Idle`.
    pub async fn configure(&self, config: SessionConfig, hooks: EngineHooks) -> Result<()> {
        self.request(|reply| LifecycleCommand::Configure {
            config,
            hooks,
            reply,
        })
        .await
    }

    /// Instantiate and open the engine; returns its version string
    ///
    /// # Errors
    ///
    /// `EngineConnection` when the engine cannot be brought up.
    pub async fn connect(&self) -> Result<String> {
        self.request(|reply| LifecycleCommand::Connect { reply }).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`.
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| LifecycleCommand::Disconnect { reply }).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`, `EngineConnection` when the
    /// second connect fails.
    pub async fn reconnect(&self) -> Result<String> {
        self.request(|reply| LifecycleCommand::Reconnect { reply }).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` unless `Configured` or `Error`.
    pub async fn reset(&self) -> Result<()> {
        self.request(|reply| LifecycleCommand::Reset { reply }).await
    }

    /// # Errors
    ///
    /// `Query` when the statement fails; the controller moves to `Error`.
    pub async fn execute_query(&self, request: QueryRequest) -> Result<QueryOutput> {
        self.request(|reply| LifecycleCommand::ExecuteQuery { request, reply }).await
    }

    /// # Errors
    ///
    /// `Transaction` when the connection or `BEGIN` fails.
    pub async fn begin_transaction(&self) -> Result<()> {
        self.request(|reply| LifecycleCommand::BeginTransaction { reply }).await
    }

    /// # Errors
    ///
    /// `Transaction` when the statement fails; the transaction is rolled back.
    pub async fn execute_in_transaction(&self, sql: &str) -> Result<ResultSet> {
        let sql = sql.to_string();
        self.request(|reply| LifecycleCommand::ExecuteInTransaction { sql, reply }).await
    }

    /// # Errors
    ///
    /// `Transaction` when `COMMIT` fails.
    pub async fn commit(&self) -> Result<()> {
        self.request(|reply| LifecycleCommand::Commit { reply }).await
    }

    /// # Errors
    ///
    /// `Transaction` when `ROLLBACK` fails.
    pub async fn rollback(&self) -> Result<()> {
        self.request(|reply| LifecycleCommand::Rollback { reply }).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`.
    pub async fn list_tables(&self) -> Result<Vec<LoadedTableEntry>> {
        self.catalog_request(|reply| CatalogRequest::ListTables { reply }).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`.
    pub async fn list_definitions(&self) -> Result<Vec<TableDefinition>> {
        self.catalog_request(|reply| CatalogRequest::ListDefinitions { reply }).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`.
    pub async fn table_metadata(&self, table_spec_name: &str) -> Result<TableMetadata> {
        let table_spec_name = table_spec_name.to_string();
        self.catalog_request(|reply| CatalogRequest::GetTableMetadata {
            table_spec_name,
            reply,
        })
        .await
    }

    /// Queue a load; the ticket resolves after the load and retention pass
    ///
    /// # Errors
    ///
    /// `ActorUnavailable` when the controller has stopped. A rejected
    /// command surfaces on the ticket.
    pub async fn enqueue_load(&self, request: PendingTableLoad) -> Result<LoadTicket> {
        let (reply, rx) = oneshot::channel();
        let request_id = request.request_id.clone();
        self.send(LifecycleCommand::Catalog(CatalogRequest::LoadTable {
            request,
            reply,
        }))
        .await?;
        Ok(LoadTicket::new(request_id, rx))
    }

    /// # Errors
    ///
    /// See [`LoadTicket::wait`].
    pub async fn load_table(&self, request: PendingTableLoad) -> Result<LoadedTableEntry> {
        self.enqueue_load(request).await?.wait().await
    }

    /// # Errors
    ///
    /// `TableDefinitionNotFound` for an unknown name, `Drop` when the engine fails.
    pub async fn drop_table(&self, table_spec_name: &str) -> Result<()> {
        let table_spec_name = table_spec_name.to_string();
        self.catalog_request(|reply| CatalogRequest::DropTable {
            table_spec_name,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`.
    pub async fn subscribe(&self, subscription: CatalogSubscription) -> Result<()> {
        self.catalog_request(|reply| CatalogRequest::Subscribe {
            subscription,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<bool> {
        let subscription_id = subscription_id.to_string();
        self.catalog_request(|reply| CatalogRequest::Unsubscribe {
            subscription_id,
            reply,
        })
        .await
    }

    /// # Errors
    ///
    /// `InvalidTransition` outside `Connected`.
    pub async fn force_notify(&self, subscription_id: &str) -> Result<bool> {
        let subscription_id = subscription_id.to_string();
        self.catalog_request(|reply| CatalogRequest::ForceNotify {
            subscription_id,
            reply,
        })
        .await
    }

    pub fn state(&self) -> LifecycleState {
        self.view.borrow().state
    }

    /// Controller view with the catalog snapshot nested
    pub fn snapshot(&self) -> LifecycleSnapshot {
        let view = self.view.borrow().clone();
        LifecycleSnapshot::compose(view, self.catalog.snapshot())
    }

    /// The session's catalog orchestrator
    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    /// Wait until the controller reaches `state`
    ///
    /// # Errors
    ///
    /// `ActorUnavailable` when the controller stops first.
    pub async fn wait_for_state(&self, state: LifecycleState) -> Result<LifecycleSnapshot> {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(|v| v.state == state)
            .await
            .map_err(|_| unavailable())?
            .clone();
        Ok(LifecycleSnapshot::compose(view, self.catalog.snapshot()))
    }
}
