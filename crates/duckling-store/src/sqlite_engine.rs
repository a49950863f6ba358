//! SQLite engine collaborator
//!
//! One `rusqlite::Connection` per engine instance, held behind a mutex
//! because `rusqlite::Connection` is not `Sync`. Every `connect()` hands
//! out a lightweight session over that shared connection, so all sessions
//! observe the same transaction state. Blocking SQLite calls run on the
//! tokio blocking pool.

use crate::db;
use crate::errors::{connection_closed, from_rusqlite, missing_table, terminated};
use crate::rows::{from_sql, infer_columns, parse_rows, to_sql};
use async_trait::async_trait;
use duckling_core::config::{EngineInitParams, EngineOpenConfig, LogLevel};
use duckling_core::engine::{
    ConnectionRef, EngineConnection, EngineError, EngineFactory, EngineInstance, EngineRef,
    EngineResult, InsertData, InsertOptions, InstantiationProgress, ProgressHandler, ResultSet,
};
use duckling_core::model::quote_ident;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type SharedDb = Arc<Mutex<Option<Connection>>>;

fn live(slot: &mut Option<Connection>) -> EngineResult<&mut Connection> {
    slot.as_mut().ok_or_else(terminated)
}

async fn blocking<T, F>(db: &SharedDb, f: F) -> EngineResult<T>
where
    F: FnOnce(&mut Option<Connection>) -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || {
        let mut slot = db.lock();
        f(&mut slot)
    })
    .await
    .map_err(|e| EngineError::new(format!("SQLite task failed: {}", e)))?
}

/// Creates SQLite engine instances
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteEngineFactory;

impl SqliteEngineFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineFactory for SqliteEngineFactory {
    async fn instantiate(
        &self,
        params: &EngineInitParams,
        progress: Option<ProgressHandler>,
    ) -> EngineResult<EngineRef> {
        let engine = SqliteEngine::in_memory(params.log_level)?;
        // SQLite is linked in; report instantiation as complete in one step
        if let Some(progress) = progress {
            progress(InstantiationProgress {
                bytes_loaded: 1,
                bytes_total: 1,
            });
        }
        tracing::info!(
            sqlite_version = rusqlite::version(),
            "SQLite engine instantiated"
        );
        Ok(Arc::new(engine))
    }
}

/// An instantiated SQLite engine
pub struct SqliteEngine {
    db: SharedDb,
    log_statements: bool,
}

impl SqliteEngine {
    /// Engine over a fresh in-memory database
    ///
    /// # Errors
    ///
    /// Fails when SQLite cannot allocate the database.
    pub fn in_memory(log_level: LogLevel) -> EngineResult<Self> {
        Ok(Self {
            db: Arc::new(Mutex::new(Some(db::open_in_memory()?))),
            log_statements: log_level == LogLevel::Debug,
        })
    }
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("terminated", &self.db.lock().is_none())
            .finish()
    }
}

#[async_trait]
impl EngineInstance for SqliteEngine {
    async fn open(&self, config: &EngineOpenConfig) -> EngineResult<()> {
        let config = config.clone();
        blocking(&self.db, move |slot| {
            live(slot)?;
            let conn = db::open_with(&config)?;
            // The previous database is closed on drop
            *slot = Some(conn);
            tracing::info!(
                path = config.path.as_deref().unwrap_or(":memory:"),
                pragmas = config.pragmas.len(),
                "SQLite database opened"
            );
            Ok(())
        })
        .await
    }

    async fn connect(&self) -> EngineResult<ConnectionRef> {
        if self.db.lock().is_none() {
            return Err(terminated());
        }
        Ok(Arc::new(SqliteConnection {
            db: Arc::clone(&self.db),
            closed: AtomicBool::new(false),
            log_statements: self.log_statements,
        }))
    }

    async fn terminate(&self) -> EngineResult<()> {
        blocking(&self.db, |slot| match slot.take() {
            Some(conn) => conn.close().map_err(|(_, e)| from_rusqlite(e)),
            None => Ok(()),
        })
        .await
    }

    async fn version(&self) -> EngineResult<String> {
        if self.db.lock().is_none() {
            return Err(terminated());
        }
        Ok(format!("SQLite {}", rusqlite::version()))
    }
}

/// A session over the engine's shared SQLite connection
pub struct SqliteConnection {
    db: SharedDb,
    closed: AtomicBool,
    log_statements: bool,
}

impl SqliteConnection {
    fn ensure_open(&self) -> EngineResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(connection_closed())
        } else {
            Ok(())
        }
    }
}

fn run_query(conn: &Connection, sql: &str) -> EngineResult<ResultSet> {
    let mut stmt = conn.prepare(sql).map_err(from_rusqlite)?;
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let width = columns.len();

    let mut rows = stmt.query([]).map_err(from_rusqlite)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(from_rusqlite)? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(from_sql(row.get_ref(i).map_err(from_rusqlite)?));
        }
        out.push(values);
    }

    Ok(ResultSet { columns, rows: out })
}

fn unknown_schema(err: &EngineError) -> Option<String> {
    err.message
        .strip_prefix("unknown database ")
        .map(|name| name.trim().trim_matches('"').to_string())
}

fn insert_rows(
    conn: &mut Connection,
    data: &InsertData,
    options: &InsertOptions,
) -> EngineResult<usize> {
    let rows = parse_rows(data)?;
    db::ensure_schema(conn, &options.schema)?;
    let qualified = format!(
        "{}.{}",
        quote_ident(&options.schema),
        quote_ident(&options.name)
    );

    let exists = db::table_exists(conn, &options.schema, &options.name)?;
    if options.create && exists {
        return Err(EngineError::entry_already_exists(&qualified));
    }
    if !options.create && !exists {
        return Err(missing_table(&qualified));
    }
    if rows.is_empty() {
        tracing::debug!(table = %qualified, "No rows to insert");
        return Ok(0);
    }

    let columns = infer_columns(&rows);
    let column_list = columns
        .iter()
        .map(|(name, _)| quote_ident(name))
        .collect::<Vec<_>>()
        .join(", ");

    let savepoint = conn.savepoint().map_err(from_rusqlite)?;
    if options.create {
        let definitions = columns
            .iter()
            .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        savepoint
            .execute_batch(&format!("CREATE TABLE {} ({});", qualified, definitions))
            .map_err(from_rusqlite)?;
    }
    {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut stmt = savepoint
            .prepare(&format!(
                "INSERT INTO {} ({}) VALUES ({})",
                qualified, column_list, placeholders
            ))
            .map_err(from_rusqlite)?;
        for row in &rows {
            let params = columns
                .iter()
                .map(|(name, _)| to_sql(row.get(name).unwrap_or(&Value::Null)));
            stmt.execute(rusqlite::params_from_iter(params))
                .map_err(from_rusqlite)?;
        }
    }
    savepoint.commit().map_err(from_rusqlite)?;
    Ok(rows.len())
}

#[async_trait]
impl EngineConnection for SqliteConnection {
    async fn query(&self, sql: &str) -> EngineResult<ResultSet> {
        self.ensure_open()?;
        if self.log_statements {
            tracing::debug!(sql, "SQLite query");
        }
        let sql = sql.to_string();
        blocking(&self.db, move |slot| {
            let conn = live(slot)?;
            match run_query(conn, &sql) {
                Err(err) => match unknown_schema(&err) {
                    Some(schema) => {
                        db::ensure_schema(conn, &schema)?;
                        run_query(conn, &sql)
                    }
                    None => Err(err),
                },
                ok => ok,
            }
        })
        .await
    }

    async fn bulk_insert(&self, data: &InsertData, options: &InsertOptions) -> EngineResult<()> {
        self.ensure_open()?;
        let data = data.clone();
        let options = options.clone();
        let inserted = blocking(&self.db, move |slot| {
            insert_rows(live(slot)?, &data, &options)
        })
        .await?;
        if self.log_statements {
            tracing::debug!(rows = inserted, "SQLite bulk insert");
        }
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
