//! Duckling Store - SQLite-backed embedded engine
//!
//! Provides:
//! - `SqliteEngineFactory`, an engine collaborator over a bundled SQLite
//! - Database open helpers with pragma configuration
//! - JSON row to SQL value conversion for bulk inserts

pub mod db;
pub mod errors;
pub mod rows;
pub mod sqlite_engine;

pub use sqlite_engine::{SqliteConnection, SqliteEngine, SqliteEngineFactory};
