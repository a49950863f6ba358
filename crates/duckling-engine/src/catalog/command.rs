//! Catalog command surface
//!
//! One closed enum per command family. Every command that produces a result
//! carries its own reply channel.

use duckling_core::engine::EngineRef;
use duckling_core::errors::{DucklingError, Result};
use duckling_core::model::{
    CatalogSubscription, LoadedTableEntry, PendingTableLoad, TableDefinition, TableMetadata,
};
use tokio::sync::oneshot;

/// Reply channel for one request
pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Messages accepted by the catalog orchestrator
pub enum CatalogCommand {
    Configure {
        table_definitions: Vec<TableDefinition>,
        reply: Reply<()>,
    },
    Connect {
        reply: Reply<()>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    Reset {
        reply: Reply<()>,
    },
    ListTables {
        reply: Reply<Vec<LoadedTableEntry>>,
    },
    ListDefinitions {
        reply: Reply<Vec<TableDefinition>>,
    },
    GetTableMetadata {
        table_spec_name: String,
        reply: Reply<TableMetadata>,
    },
    /// Resolves once the load and its retention pass have completed
    LoadTable {
        request: PendingTableLoad,
        engine: EngineRef,
        reply: Reply<LoadedTableEntry>,
    },
    DropTable {
        table_spec_name: String,
        engine: EngineRef,
        reply: Reply<()>,
    },
    Subscribe {
        subscription: CatalogSubscription,
        reply: Reply<()>,
    },
    /// Replies whether a subscription was removed
    Unsubscribe {
        subscription_id: String,
        reply: Reply<bool>,
    },
    /// Replies whether `on_change` was invoked
    ForceNotify {
        subscription_id: String,
        reply: Reply<bool>,
    },
}

impl CatalogCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CatalogCommand::Configure { .. } => "CATALOG.CONFIGURE",
            CatalogCommand::Connect { .. } => "CATALOG.CONNECT",
            CatalogCommand::Disconnect { .. } => "CATALOG.DISCONNECT",
            CatalogCommand::Reset { .. } => "CATALOG.RESET",
            CatalogCommand::ListTables { .. } => "CATALOG.LIST_TABLES",
            CatalogCommand::ListDefinitions { .. } => "CATALOG.LIST_DEFINITIONS",
            CatalogCommand::GetTableMetadata { .. } => "CATALOG.GET_TABLE_METADATA",
            CatalogCommand::LoadTable { .. } => "CATALOG.LOAD_TABLE",
            CatalogCommand::DropTable { .. } => "CATALOG.DROP_TABLE",
            CatalogCommand::Subscribe { .. } => "CATALOG.SUBSCRIBE",
            CatalogCommand::Unsubscribe { .. } => "CATALOG.UNSUBSCRIBE",
            CatalogCommand::ForceNotify { .. } => "CATALOG.FORCE_NOTIFY",
        }
    }
}

/// Catalog commands as issued by a client of the lifecycle controller
///
/// The controller forwards these only while connected, attaching its
/// engine handle.
pub enum CatalogRequest {
    ListTables {
        reply: Reply<Vec<LoadedTableEntry>>,
    },
    ListDefinitions {
        reply: Reply<Vec<TableDefinition>>,
    },
    GetTableMetadata {
        table_spec_name: String,
        reply: Reply<TableMetadata>,
    },
    LoadTable {
        request: PendingTableLoad,
        reply: Reply<LoadedTableEntry>,
    },
    DropTable {
        table_spec_name: String,
        reply: Reply<()>,
    },
    Subscribe {
        subscription: CatalogSubscription,
        reply: Reply<()>,
    },
    Unsubscribe {
        subscription_id: String,
        reply: Reply<bool>,
    },
    ForceNotify {
        subscription_id: String,
        reply: Reply<bool>,
    },
}

impl CatalogRequest {
    /// Bind the request to an engine handle
    pub fn attach(self, engine: &EngineRef) -> CatalogCommand {
        match self {
            CatalogRequest::ListTables { reply } => CatalogCommand::ListTables { reply },
            CatalogRequest::ListDefinitions { reply } => CatalogCommand::ListDefinitions { reply },
            CatalogRequest::GetTableMetadata {
                table_spec_name,
                reply,
            } => CatalogCommand::GetTableMetadata {
                table_spec_name,
                reply,
            },
            CatalogRequest::LoadTable { request, reply } => CatalogCommand::LoadTable {
                request,
                engine: EngineRef::clone(engine),
                reply,
            },
            CatalogRequest::DropTable {
                table_spec_name,
                reply,
            } => CatalogCommand::DropTable {
                table_spec_name,
                engine: EngineRef::clone(engine),
                reply,
            },
            CatalogRequest::Subscribe {
                subscription,
                reply,
            } => CatalogCommand::Subscribe {
                subscription,
                reply,
            },
            CatalogRequest::Unsubscribe {
                subscription_id,
                reply,
            } => CatalogCommand::Unsubscribe {
                subscription_id,
                reply,
            },
            CatalogRequest::ForceNotify {
                subscription_id,
                reply,
            } => CatalogCommand::ForceNotify {
                subscription_id,
                reply,
            },
        }
    }

    /// Answer the request with an error without forwarding it
    pub fn reject(self, err: DucklingError) {
        match self {
            CatalogRequest::ListTables { reply } => {
                let _ = reply.send(Err(err));
            }
            CatalogRequest::ListDefinitions { reply } => {
                let _ = reply.send(Err(err));
            }
            CatalogRequest::GetTableMetadata { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            CatalogRequest::LoadTable { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            CatalogRequest::DropTable { reply, .. } | CatalogRequest::Subscribe { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            CatalogRequest::Unsubscribe { reply, .. }
            | CatalogRequest::ForceNotify { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CatalogRequest::ListTables { .. } => "CATALOG.LIST_TABLES",
            CatalogRequest::ListDefinitions { .. } => "CATALOG.LIST_DEFINITIONS",
            CatalogRequest::GetTableMetadata { .. } => "CATALOG.GET_TABLE_METADATA",
            CatalogRequest::LoadTable { .. } => "CATALOG.LOAD_TABLE",
            CatalogRequest::DropTable { .. } => "CATALOG.DROP_TABLE",
            CatalogRequest::Subscribe { .. } => "CATALOG.SUBSCRIBE",
            CatalogRequest::Unsubscribe { .. } => "CATALOG.UNSUBSCRIBE",
            CatalogRequest::ForceNotify { .. } => "CATALOG.FORCE_NOTIFY",
        }
    }
}
