//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names identical across both state machines,
//! the workers and the engine implementations.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_REQUEST_ID: &str = "request_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Catalog identifiers
pub const FIELD_TABLE_SPEC_NAME: &str = "table_spec_name";
pub const FIELD_TABLE_INSTANCE_NAME: &str = "table_instance_name";
pub const FIELD_TABLE_VERSION_ID: &str = "table_version_id";
pub const FIELD_SUBSCRIPTION_ID: &str = "subscription_id";

// State machine transitions
pub const FIELD_STATE_FROM: &str = "from";
pub const FIELD_STATE_TO: &str = "to";

// Collection sizes
pub const FIELD_QUEUE_LEN: &str = "queue_len";
pub const FIELD_ROW_COUNT: &str = "row_count";
pub const FIELD_DROPPED_LEN: &str = "dropped_len";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
