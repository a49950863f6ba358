//! Connection lifecycle controller
//!
//! Top-level state machine of a session: engine initialisation and
//! termination, one-shot queries, the transaction sub-machine, and
//! forwarding of catalog commands with the live engine handle attached.

mod actor;
pub mod command;
pub mod handle;
pub mod state;
mod work;

pub use command::{LifecycleCommand, QueryOutput, QueryRequest, ResultShape};
pub use handle::DatabaseHandle;
pub use state::{LifecycleSnapshot, LifecycleState, TransactionState};
