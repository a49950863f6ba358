//! Catalog orchestrator
//!
//! Owns the table definitions, the loaded versions, the version counter,
//! the FIFO mutation queue and the subscriptions. Runs as a single actor
//! task; see [`CatalogHandle`].

mod actor;
pub mod command;
pub mod handle;
pub mod state;

pub use command::{CatalogCommand, CatalogRequest, Reply};
pub use handle::{CatalogHandle, LoadTicket, DEFAULT_COMMAND_CAPACITY};
pub use state::{CatalogSnapshot, CatalogState};
