//! Duckling Core - catalog model, engine interface and table workers
//!
//! This crate provides the pieces the lifecycle controller and catalog
//! orchestrator are built from:
//! - Session configuration and table definitions
//! - The engine collaborator traits (factory, instance, connection)
//! - Loader and Pruner workers that materialise and retire table versions
//! - The canonical error and logging facilities shared across the workspace

pub mod config;
pub mod engine;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod ops;

// Macros resolve schema constants through this path
pub use duckling_core_types;

pub use config::{EngineInitParams, EngineOpenConfig, LogLevel, SessionConfig};
pub use engine::{
    ConnectionRef, EngineConnection, EngineError, EngineFactory, EngineHooks, EngineInstance,
    EngineRef, EngineResult, InitStatus, InsertData, InsertOptions, ResultSet,
};
pub use errors::{DucklingError, ExError, ExErrorKind, Result};
pub use model::{
    CatalogSubscription, LoadedTableEntry, PayloadCompression, PayloadType, PendingTableLoad,
    TableDefinition, TableMetadata,
};
