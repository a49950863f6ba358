//! Error handling for duckling-store
//!
//! Maps SQLite failures onto the engine collaborator's structured error

use duckling_core::engine::EngineError;

/// Create an engine error from rusqlite::Error
///
/// SQLite failures carry their primary result code as the subtype.
pub fn from_rusqlite(err: rusqlite::Error) -> EngineError {
    match &err {
        rusqlite::Error::SqliteFailure(code, message) => {
            EngineError::new(message.clone().unwrap_or_else(|| err.to_string()))
                .with_subtype(format!("{:?}", code.code))
        }
        _ => EngineError::new(err.to_string()),
    }
}

/// Error for any call made after `terminate`
pub fn terminated() -> EngineError {
    EngineError::new("Engine has been terminated").with_subtype("TERMINATED")
}

/// Error for a call on a closed connection
pub fn connection_closed() -> EngineError {
    EngineError::new("Connection has been closed").with_subtype("CONNECTION_CLOSED")
}

/// Error for an append into a table that does not exist
pub fn missing_table(qualified_name: &str) -> EngineError {
    EngineError::new(format!("Table {} does not exist", qualified_name))
        .with_subtype("ENTRY_NOT_FOUND")
}

/// Error for a rejected pragma or payload shape
pub fn invalid_input(message: impl Into<String>) -> EngineError {
    EngineError::new(message).with_subtype("INVALID_INPUT")
}
