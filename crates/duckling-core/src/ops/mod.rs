//! Loader and Pruner workers
//!
//! Plain async functions over an engine handle. They perform no state
//! transitions; the catalog orchestrator invokes them and folds their
//! results into its own state.

pub mod load;
pub mod payload;
pub mod prune;

pub use load::{load_table, LoadInput};
pub use payload::decode_payload;
pub use prune::{drop_in_transaction, drop_table, plan_prune, prune_versions, PrunePlan};
