//! Lifecycle command surface

use crate::catalog::{CatalogRequest, Reply};
use duckling_core::config::SessionConfig;
use duckling_core::engine::{EngineHooks, ResultSet};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a one-shot query result is shaped on the reply channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultShape {
    /// One JSON object per row
    #[default]
    Json,
    /// Column names plus positional rows
    Columnar,
}

/// Payload of `QUERY.EXECUTE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Free-form label carried into logs and errors
    pub description: String,
    pub sql: String,
    #[serde(default)]
    pub result_shape: ResultShape,
}

impl QueryRequest {
    pub fn new(description: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            sql: sql.into(),
            result_shape: ResultShape::Json,
        }
    }

    pub fn columnar(mut self) -> Self {
        self.result_shape = ResultShape::Columnar;
        self
    }
}

/// Shaped result of a one-shot query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    Json(Vec<Map<String, Value>>),
    Columnar(ResultSet),
}

impl QueryOutput {
    pub(crate) fn shape(result: ResultSet, shape: ResultShape) -> Self {
        match shape {
            ResultShape::Json => QueryOutput::Json(result.to_json_rows()),
            ResultShape::Columnar => QueryOutput::Columnar(result),
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            QueryOutput::Json(rows) => rows.len(),
            QueryOutput::Columnar(result) => result.row_count(),
        }
    }
}

/// Messages accepted by the lifecycle controller
pub enum LifecycleCommand {
    Configure {
        config: SessionConfig,
        hooks: EngineHooks,
        reply: Reply<()>,
    },
    /// Replies with the engine version string
    Connect {
        reply: Reply<String>,
    },
    Disconnect {
        reply: Reply<()>,
    },
    /// Disconnect, then connect again with the same parameters
    Reconnect {
        reply: Reply<String>,
    },
    Reset {
        reply: Reply<()>,
    },
    ExecuteQuery {
        request: QueryRequest,
        reply: Reply<QueryOutput>,
    },
    BeginTransaction {
        reply: Reply<()>,
    },
    ExecuteInTransaction {
        sql: String,
        reply: Reply<ResultSet>,
    },
    Commit {
        reply: Reply<()>,
    },
    Rollback {
        reply: Reply<()>,
    },
    /// Forwarded to the catalog with the current engine handle
    Catalog(CatalogRequest),
}

impl LifecycleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleCommand::Configure { .. } => "CONFIGURE",
            LifecycleCommand::Connect { .. } => "CONNECT",
            LifecycleCommand::Disconnect { .. } => "DISCONNECT",
            LifecycleCommand::Reconnect { .. } => "RECONNECT",
            LifecycleCommand::Reset { .. } => "RESET",
            LifecycleCommand::ExecuteQuery { .. } => "QUERY.EXECUTE",
            LifecycleCommand::BeginTransaction { .. } => "TRANSACTION.BEGIN",
            LifecycleCommand::ExecuteInTransaction { .. } => "TRANSACTION.EXECUTE",
            LifecycleCommand::Commit { .. } => "TRANSACTION.COMMIT",
            LifecycleCommand::Rollback { .. } => "TRANSACTION.ROLLBACK",
            LifecycleCommand::Catalog(request) => request.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_wire_shape() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"description":"count","sql":"SELECT 1","resultShape":"columnar"}"#)
                .unwrap();
        assert_eq!(request.result_shape, ResultShape::Columnar);

        let defaulted: QueryRequest =
            serde_json::from_str(r#"{"description":"count","sql":"SELECT 1"}"#).unwrap();
        assert_eq!(defaulted.result_shape, ResultShape::Json);
    }

    #[test]
    fn test_shape_json_rows() {
        let result = ResultSet {
            columns: vec!["n".to_string()],
            rows: vec![vec![Value::from(1)], vec![Value::from(2)]],
        };
        let output = QueryOutput::shape(result.clone(), ResultShape::Json);
        assert_eq!(output.row_count(), 2);
        match output {
            QueryOutput::Json(rows) => assert_eq!(rows[1]["n"], Value::from(2)),
            QueryOutput::Columnar(_) => panic!("expected json rows"),
        }
        assert_eq!(
            QueryOutput::shape(result.clone(), ResultShape::Columnar),
            QueryOutput::Columnar(result)
        );
    }
}
