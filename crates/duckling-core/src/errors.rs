use duckling_core_types::RequestId;
use thiserror::Error;

/// Result type alias using DucklingError
pub type Result<T> = std::result::Result<T, DucklingError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code used in structured logs and by
/// callers that want to branch on the failure class without matching on
/// the full `DucklingError` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Configuration
    Configuration,

    // Catalog
    NotFound,
    PayloadDecode,
    Load,
    Prune,
    Drop,

    // Engine / session
    EngineConnection,
    Query,
    Transaction,

    // State machine
    InvalidTransition,
    Cancelled,
    Unavailable,

    // Internal
    Serialization,
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Configuration => "ERR_CONFIGURATION",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::PayloadDecode => "ERR_PAYLOAD_DECODE",
            ExErrorKind::Load => "ERR_LOAD",
            ExErrorKind::Prune => "ERR_PRUNE",
            ExErrorKind::Drop => "ERR_DROP",
            ExErrorKind::EngineConnection => "ERR_ENGINE_CONNECTION",
            ExErrorKind::Query => "ERR_QUERY",
            ExErrorKind::Transaction => "ERR_TRANSACTION",
            ExErrorKind::InvalidTransition => "ERR_INVALID_TRANSITION",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::Unavailable => "ERR_UNAVAILABLE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries classification fields for programmatic handling plus the
/// catalog context (table, version, engine subtype) needed for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    table: Option<String>,
    version_id: Option<u64>,
    request_id: Option<RequestId>,
    subtype: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            table: None,
            version_id: None,
            request_id: None,
            subtype: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add table (logical or physical) context
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add table version context
    pub fn with_version_id(mut self, version_id: u64) -> Self {
        self.version_id = Some(version_id);
        self
    }

    /// Add request ID context
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Add the engine-reported error subtype
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn version_id(&self) -> Option<u64> {
        self.version_id
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(table) = &self.table {
            write!(f, " (table: {})", table)?;
        }
        if let Some(version_id) = self.version_id {
            write!(f, " (version: {})", version_id)?;
        }
        if let Some(subtype) = &self.subtype {
            write!(f, " (subtype: {})", subtype)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

// ========== End Error Facility ==========

/// Error taxonomy for catalog and session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DucklingError {
    // ===== Configuration =====
    /// Malformed init parameters or table definitions
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    // ===== Engine / session =====
    /// The engine could not be instantiated, opened or reached
    #[error("Engine connection failed: {message}")]
    EngineConnection { message: String },

    /// A one-shot query failed
    #[error("Query '{description}' failed: {message}")]
    Query { description: String, message: String },

    /// A transaction statement failed
    #[error("Transaction {stage} failed: {message}")]
    Transaction { stage: String, message: String },

    // ===== Catalog =====
    /// A load referenced a table name with no definition
    #[error("Table definition not found: {table_spec_name}")]
    TableDefinitionNotFound { table_spec_name: String },

    /// The load payload could not be decoded
    #[error("Payload for {table_spec_name} could not be decoded: {reason}")]
    PayloadDecode {
        table_spec_name: String,
        reason: String,
    },

    /// Inserting a table version failed
    #[error("Loading {table_instance_name} failed: {message}")]
    Load {
        table_spec_name: String,
        table_instance_name: String,
        message: String,
        subtype: Option<String>,
    },

    /// Dropping versions beyond the retention cap failed (rolled back)
    #[error("Pruning table versions failed: {message}")]
    Prune { message: String },

    /// Dropping a logical table's instances failed (rolled back)
    #[error("Dropping table {table_spec_name} failed: {message}")]
    Drop {
        table_spec_name: String,
        message: String,
    },

    // ===== State machine =====
    /// The command is not accepted in the machine's current state
    #[error("Command {command} is not accepted in state {state}")]
    InvalidTransition { state: String, command: String },

    /// Work was discarded by a disconnect or reset before it completed
    #[error("Cancelled: {reason}")]
    Cancelled { reason: String },

    /// The actor task owning the state machine has stopped
    #[error("Actor {actor} is not running")]
    ActorUnavailable { actor: String },

    // ===== Generic =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DucklingError {
    /// Canonical kind of this error
    pub fn kind(&self) -> ExErrorKind {
        match self {
            DucklingError::Configuration { .. } => ExErrorKind::Configuration,
            DucklingError::EngineConnection { .. } => ExErrorKind::EngineConnection,
            DucklingError::Query { .. } => ExErrorKind::Query,
            DucklingError::Transaction { .. } => ExErrorKind::Transaction,
            DucklingError::TableDefinitionNotFound { .. } => ExErrorKind::NotFound,
            DucklingError::PayloadDecode { .. } => ExErrorKind::PayloadDecode,
            DucklingError::Load { .. } => ExErrorKind::Load,
            DucklingError::Prune { .. } => ExErrorKind::Prune,
            DucklingError::Drop { .. } => ExErrorKind::Drop,
            DucklingError::InvalidTransition { .. } => ExErrorKind::InvalidTransition,
            DucklingError::Cancelled { .. } => ExErrorKind::Cancelled,
            DucklingError::ActorUnavailable { .. } => ExErrorKind::Unavailable,
            DucklingError::Serialization { .. } => ExErrorKind::Serialization,
            DucklingError::Internal { .. } => ExErrorKind::Internal,
        }
    }

    pub fn invalid_transition(state: impl Into<String>, command: impl Into<String>) -> Self {
        DucklingError::InvalidTransition {
            state: state.into(),
            command: command.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        DucklingError::Cancelled {
            reason: reason.into(),
        }
    }
}

/// Conversion from DucklingError to the canonical ExError
impl From<&DucklingError> for ExError {
    fn from(err: &DucklingError) -> Self {
        let base = ExError::new(err.kind());
        match err {
            DucklingError::Configuration { reason } => {
                base.with_op("configure").with_message(reason.clone())
            }
            DucklingError::EngineConnection { message } => {
                base.with_op("connect").with_message(message.clone())
            }
            DucklingError::Query {
                description,
                message,
            } => base
                .with_op("query")
                .with_message(format!("{}: {}", description, message)),
            DucklingError::Transaction { stage, message } => base
                .with_op(format!("transaction.{}", stage))
                .with_message(message.clone()),
            DucklingError::TableDefinitionNotFound { table_spec_name } => base
                .with_op("load_table")
                .with_table(table_spec_name.clone())
                .with_message("Table definition not found"),
            DucklingError::PayloadDecode {
                table_spec_name,
                reason,
            } => base
                .with_op("decode_payload")
                .with_table(table_spec_name.clone())
                .with_message(reason.clone()),
            DucklingError::Load {
                table_instance_name,
                message,
                subtype,
                ..
            } => {
                let ex = base
                    .with_op("load_table")
                    .with_table(table_instance_name.clone())
                    .with_message(message.clone());
                match subtype {
                    Some(subtype) => ex.with_subtype(subtype.clone()),
                    None => ex,
                }
            }
            DucklingError::Prune { message } => {
                base.with_op("prune_versions").with_message(message.clone())
            }
            DucklingError::Drop {
                table_spec_name,
                message,
            } => base
                .with_op("drop_table")
                .with_table(table_spec_name.clone())
                .with_message(message.clone()),
            DucklingError::InvalidTransition { state, command } => base
                .with_op(command.clone())
                .with_message(format!("not accepted in state {}", state)),
            DucklingError::Cancelled { reason } => base.with_message(reason.clone()),
            DucklingError::ActorUnavailable { actor } => {
                base.with_message(format!("actor {} is not running", actor))
            }
            DucklingError::Serialization { message } | DucklingError::Internal { message } => {
                base.with_message(message.clone())
            }
        }
    }
}

impl From<DucklingError> for ExError {
    fn from(err: DucklingError) -> Self {
        ExError::from(&err)
    }
}

/// Conversion from serde_json::Error to DucklingError
impl From<serde_json::Error> for DucklingError {
    fn from(err: serde_json::Error) -> Self {
        DucklingError::Serialization {
            message: err.to_string(),
        }
    }
}
