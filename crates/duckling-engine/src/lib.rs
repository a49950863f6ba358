//! Duckling Engine - session state machines
//!
//! Two cooperating actors, each a tokio task owning its state:
//!
//! - **Lifecycle controller**: engine handle lifetime, queries, transactions
//! - **Catalog orchestrator**: table versions, the load queue, retention and
//!   subscriptions
//!
//! [`DatabaseHandle`] is the entry point; it spawns both.

pub mod catalog;
pub mod lifecycle;

pub use catalog::{CatalogHandle, CatalogSnapshot, CatalogState, LoadTicket};
pub use lifecycle::{
    DatabaseHandle, LifecycleSnapshot, LifecycleState, QueryOutput, QueryRequest, ResultShape,
    TransactionState,
};
