//! Catalog data model
//!
//! Table definitions describe logical tables; loaded table entries describe
//! the physical versions currently materialised in the engine.

pub mod load;
pub mod subscription;
pub mod table;

pub use load::{PayloadCompression, PayloadType, PendingTableLoad};
pub use subscription::{CatalogSubscription, OnChange, OnSubscribe};
pub use table::{find_definition, quote_ident, LoadedTableEntry, TableDefinition, TableMetadata};
