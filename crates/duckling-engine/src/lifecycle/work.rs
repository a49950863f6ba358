//! Engine work run outside the controller task
//!
//! Each function is awaited by a spawned task and its result reported back
//! to the controller as a completion.

use super::command::{QueryOutput, QueryRequest};
use crate::catalog::CatalogHandle;
use duckling_core::config::EngineInitParams;
use duckling_core::engine::{
    ConnectionRef, EngineError, EngineFactory, EngineHooks, EngineRef, ResultSet,
};
use duckling_core::errors::{DucklingError, Result};
use std::sync::Arc;

fn connection_error(err: EngineError) -> DucklingError {
    DucklingError::EngineConnection {
        message: err.message,
    }
}

fn transaction_error(stage: &str, err: EngineError) -> DucklingError {
    DucklingError::Transaction {
        stage: stage.to_string(),
        message: err.message,
    }
}

/// Instantiate, open and identify an engine
///
/// A half-initialised instance is terminated before the error is returned.
pub(crate) async fn initialize(
    factory: Arc<dyn EngineFactory>,
    params: EngineInitParams,
    hooks: EngineHooks,
) -> Result<(EngineRef, String)> {
    let engine = factory
        .instantiate(&params, hooks.progress.clone())
        .await
        .map_err(connection_error)?;

    let opened = match &params.open {
        Some(config) => engine.open(config).await,
        None => Ok(()),
    };
    let identified = match opened {
        Ok(()) => engine.version().await,
        Err(err) => Err(err),
    };
    match identified {
        Ok(version) => Ok((engine, version)),
        Err(err) => {
            if let Err(term) = engine.terminate().await {
                tracing::debug!(error = %term, "Terminate after failed open also failed");
            }
            Err(connection_error(err))
        }
    }
}

/// Run a one-shot query on a fresh connection
pub(crate) async fn run_query(engine: EngineRef, request: QueryRequest) -> Result<QueryOutput> {
    let query_error = |err: EngineError| DucklingError::Query {
        description: request.description.clone(),
        message: err.message,
    };
    let conn = engine.connect().await.map_err(query_error)?;
    let result = conn.query(&request.sql).await;
    if let Err(err) = conn.close().await {
        tracing::debug!(error = %err, "Closing query connection failed");
    }
    let result = result.map_err(query_error)?;
    Ok(QueryOutput::shape(result, request.result_shape))
}

async fn release(conn: &ConnectionRef) {
    if let Err(err) = conn.close().await {
        tracing::debug!(error = %err, "Closing transaction connection failed");
    }
}

/// Roll back and release after a failed transaction step
async fn abandon(conn: &ConnectionRef) {
    if let Err(err) = conn.query("ROLLBACK").await {
        tracing::debug!(error = %err, "Rollback after transaction failure failed");
    }
    release(conn).await;
}

/// Open the dedicated transaction connection and issue `BEGIN TRANSACTION`
///
/// Waits for queued and running catalog mutations first. The controller
/// forwards no catalog commands while a transaction is open, so the two
/// never write concurrently.
pub(crate) async fn begin(engine: EngineRef, catalog: CatalogHandle) -> Result<ConnectionRef> {
    let settled = catalog.wait_settled().await.map_err(|e| DucklingError::Transaction {
        stage: "begin".to_string(),
        message: e.to_string(),
    })?;
    tracing::debug!(catalog_state = %settled.state, "Catalog settled before transaction");
    let conn = engine
        .connect()
        .await
        .map_err(|e| transaction_error("begin", e))?;
    if let Err(err) = conn.query("BEGIN TRANSACTION").await {
        release(&conn).await;
        return Err(transaction_error("begin", err));
    }
    Ok(conn)
}

/// Run one statement inside the open transaction
///
/// On failure the transaction is rolled back and its connection released.
pub(crate) async fn execute(conn: ConnectionRef, sql: String) -> Result<ResultSet> {
    match conn.query(&sql).await {
        Ok(result) => Ok(result),
        Err(err) => {
            abandon(&conn).await;
            Err(transaction_error("execute", err))
        }
    }
}

/// Terminal step of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Finish {
    Commit,
    Rollback,
}

impl Finish {
    pub(crate) fn stage(self) -> &'static str {
        match self {
            Finish::Commit => "commit",
            Finish::Rollback => "rollback",
        }
    }

    fn statement(self) -> &'static str {
        match self {
            Finish::Commit => "COMMIT",
            Finish::Rollback => "ROLLBACK",
        }
    }
}

/// Commit or roll back, then release the connection
pub(crate) async fn finish(conn: ConnectionRef, how: Finish) -> Result<()> {
    match conn.query(how.statement()).await {
        Ok(_) => {
            release(&conn).await;
            Ok(())
        }
        Err(err) => {
            match how {
                Finish::Commit => abandon(&conn).await,
                Finish::Rollback => release(&conn).await,
            }
            Err(transaction_error(how.stage(), err))
        }
    }
}
