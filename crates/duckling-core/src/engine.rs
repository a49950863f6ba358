//! Embedded engine collaborator interface
//!
//! The analytical engine is consumed as an opaque service. These traits are
//! the only surface the workers and state machines depend on, so any engine
//! (or an in-memory fake) can be substituted.

use crate::config::{EngineInitParams, EngineOpenConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Subtype reported when `create=true` targets a table that already exists
pub const ENTRY_ALREADY_EXISTS: &str = "ENTRY_ALREADY_EXISTS";

/// Result type for engine collaborator calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Shared handle to an instantiated engine
pub type EngineRef = Arc<dyn EngineInstance>;

/// Shared handle to one engine connection
pub type ConnectionRef = Arc<dyn EngineConnection>;

/// Structured error raised by the engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
    pub subtype: Option<String>,
}

#[derive(Deserialize)]
struct RawEngineError {
    #[serde(alias = "exception_message", alias = "error_message", default)]
    message: Option<String>,
    #[serde(alias = "error_subtype", alias = "exception_subtype", default)]
    subtype: Option<String>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            subtype: None,
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Error for a `create=true` insert into an existing table
    pub fn entry_already_exists(table: &str) -> Self {
        Self::new(format!("Table with name {} already exists", table))
            .with_subtype(ENTRY_ALREADY_EXISTS)
    }

    /// Interpret an error message that may be a serialized JSON object
    ///
    /// Some engines stringify their structured errors; when the message parses
    /// as JSON carrying `exception_subtype`/`error_subtype`, the subtype is
    /// recovered. Anything else becomes a plain message.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<RawEngineError>(raw) {
            Ok(parsed) if parsed.subtype.is_some() || parsed.message.is_some() => Self {
                message: parsed.message.unwrap_or_else(|| raw.to_string()),
                subtype: parsed.subtype,
            },
            _ => Self::new(raw),
        }
    }

    pub fn is_entry_already_exists(&self) -> bool {
        self.subtype.as_deref() == Some(ENTRY_ALREADY_EXISTS)
    }
}

/// Progress reported while the engine is instantiated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantiationProgress {
    pub bytes_loaded: u64,
    pub bytes_total: u64,
}

pub type ProgressHandler = Arc<dyn Fn(InstantiationProgress) + Send + Sync>;

/// Coarse initialisation status reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Initializing,
    Ready,
    Error,
}

pub type StatusHandler = Arc<dyn Fn(InitStatus) + Send + Sync>;

/// Non-serialisable hooks attached to engine initialisation
#[derive(Clone, Default)]
pub struct EngineHooks {
    pub progress: Option<ProgressHandler>,
    pub status: Option<StatusHandler>,
}

impl EngineHooks {
    pub fn notify_status(&self, status: InitStatus) {
        if let Some(handler) = &self.status {
            handler(status);
        }
    }
}

impl fmt::Debug for EngineHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHooks")
            .field("progress", &self.progress.is_some())
            .field("status", &self.status.is_some())
            .finish()
    }
}

/// Data handed to `bulk_insert`
#[derive(Debug, Clone, PartialEq)]
pub enum InsertData {
    /// Row records (an array of objects)
    Json(serde_json::Value),
    /// Decoded columnar stream bytes
    Bytes(Vec<u8>),
}

impl InsertData {
    pub fn size_bytes(&self) -> usize {
        match self {
            InsertData::Json(value) => value.to_string().len(),
            InsertData::Bytes(bytes) => bytes.len(),
        }
    }
}

/// Target of a bulk insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOptions {
    pub name: String,
    pub schema: String,
    /// Create the table; fails with `ENTRY_ALREADY_EXISTS` if present
    pub create: bool,
}

/// Rows returned by a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First column of the first row, if any
    pub fn scalar(&self) -> Option<&serde_json::Value> {
        self.rows.first().and_then(|row| row.first())
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_json_rows(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// Creates engine instances
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// # Errors
    ///
    /// Fails when the engine cannot be instantiated.
    async fn instantiate(
        &self,
        params: &EngineInitParams,
        progress: Option<ProgressHandler>,
    ) -> EngineResult<EngineRef>;
}

/// An instantiated engine
#[async_trait]
pub trait EngineInstance: Send + Sync {
    /// # Errors
    ///
    /// Fails when the database cannot be opened with `config`.
    async fn open(&self, config: &EngineOpenConfig) -> EngineResult<()>;

    /// # Errors
    ///
    /// Fails when the engine is terminated or refuses the connection.
    async fn connect(&self) -> EngineResult<ConnectionRef>;

    /// # Errors
    ///
    /// Fails when the engine cannot shut down cleanly.
    async fn terminate(&self) -> EngineResult<()>;

    /// # Errors
    ///
    /// Fails when the engine is terminated.
    async fn version(&self) -> EngineResult<String>;
}

/// One connection to an engine
#[async_trait]
pub trait EngineConnection: Send + Sync {
    /// # Errors
    ///
    /// Structured error on SQL failure.
    async fn query(&self, sql: &str) -> EngineResult<ResultSet>;

    /// # Errors
    ///
    /// `ENTRY_ALREADY_EXISTS` subtype when `options.create` targets an
    /// existing table; other failures as reported by the engine.
    async fn bulk_insert(&self, data: &InsertData, options: &InsertOptions) -> EngineResult<()>;

    /// Release the connection
    ///
    /// # Errors
    ///
    /// As reported by the engine; callers log and ignore.
    async fn close(&self) -> EngineResult<()> {
        Ok(())
    }
}
