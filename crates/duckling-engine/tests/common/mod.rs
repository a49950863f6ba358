//! Scriptable in-memory engine for state machine tests
//!
//! Tracks tables by qualified name with a row count, records every
//! statement, and lets a test inject failures or hold inserts in flight.

#![allow(dead_code)]

use async_trait::async_trait;
use duckling_core::config::{EngineInitParams, EngineOpenConfig, SessionConfig};
use duckling_core::engine::{
    ConnectionRef, EngineConnection, EngineError, EngineFactory, EngineHooks, EngineInstance,
    EngineRef, EngineResult, InsertData, InsertOptions, InstantiationProgress, ProgressHandler,
    ResultSet,
};
use duckling_core::model::{quote_ident, TableDefinition};
use duckling_engine::DatabaseHandle;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Failures a test can switch on
#[derive(Debug, Default, Clone)]
pub struct Faults {
    pub instantiate: bool,
    pub open: bool,
    pub bulk_insert: bool,
    pub terminate: bool,
    /// Any statement containing this text fails
    pub query_containing: Option<String>,
}

#[derive(Default)]
pub struct MemoryEngine {
    tables: Mutex<BTreeMap<String, usize>>,
    statements: Mutex<Vec<String>>,
    faults: Mutex<Faults>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    terminated: AtomicBool,
    instantiations: AtomicUsize,
    terminations: AtomicUsize,
    opened_with: Mutex<Option<EngineOpenConfig>>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock() = faults;
    }

    pub fn fail_queries_containing(&self, needle: &str) {
        self.faults.lock().query_containing = Some(needle.to_string());
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Block every subsequent bulk insert until [`MemoryEngine::release`]
    pub fn hold_inserts(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `n` held inserts proceed
    pub fn release(&self, n: usize) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(n);
        }
    }

    /// Let every held and future insert proceed
    pub fn stop_holding(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.close();
        }
    }

    pub fn has_table(&self, schema: &str, name: &str) -> bool {
        self.tables.lock().contains_key(&qualified(schema, name))
    }

    pub fn rows_in(&self, schema: &str, name: &str) -> Option<usize> {
        self.tables.lock().get(&qualified(schema, name)).copied()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.lock().keys().cloned().collect()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    pub fn instantiations(&self) -> usize {
        self.instantiations.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn opened_with(&self) -> Option<EngineOpenConfig> {
        self.opened_with.lock().clone()
    }

    fn record(&self, statement: impl Into<String>) {
        self.statements.lock().push(statement.into());
    }

    fn check_live(&self) -> EngineResult<()> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(EngineError::new("database has been terminated"));
        }
        Ok(())
    }

    fn run(&self, sql: &str) -> EngineResult<ResultSet> {
        self.check_live()?;
        self.record(sql);
        if let Some(needle) = &self.faults.lock().query_containing {
            if sql.contains(needle.as_str()) {
                return Err(EngineError::new(format!("injected failure for: {}", sql)));
            }
        }

        if let Some(target) = sql.strip_prefix("DROP TABLE IF EXISTS ") {
            self.tables.lock().remove(target.trim());
            return Ok(ResultSet::default());
        }
        if let Some(target) = sql.strip_prefix("SELECT count(*) AS rowcount FROM ") {
            let rows = self
                .tables
                .lock()
                .get(target.trim())
                .copied()
                .ok_or_else(|| EngineError::new(format!("no such table: {}", target)))?;
            return Ok(ResultSet {
                columns: vec!["rowcount".to_string()],
                rows: vec![vec![Value::from(rows as u64)]],
            });
        }
        if let Some(literal) = sql.strip_prefix("SELECT ") {
            // `SELECT <n> AS <column>` echoes the literal
            if let Some((value, column)) = literal.split_once(" AS ") {
                let value = value
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(value.trim()));
                return Ok(ResultSet {
                    columns: vec![column.trim().to_string()],
                    rows: vec![vec![value]],
                });
            }
        }
        Ok(ResultSet::default())
    }
}

fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// Instance view over the shared [`MemoryEngine`]
pub struct SharedEngine(pub Arc<MemoryEngine>);

#[async_trait]
impl EngineInstance for SharedEngine {
    async fn open(&self, config: &EngineOpenConfig) -> EngineResult<()> {
        if self.0.faults.lock().open {
            return Err(EngineError::new("injected open failure"));
        }
        *self.0.opened_with.lock() = Some(config.clone());
        Ok(())
    }

    async fn connect(&self) -> EngineResult<ConnectionRef> {
        self.0.check_live()?;
        Ok(Arc::new(MemoryConnection {
            engine: Arc::clone(&self.0),
        }))
    }

    async fn terminate(&self) -> EngineResult<()> {
        self.0.terminations.fetch_add(1, Ordering::SeqCst);
        self.0.terminated.store(true, Ordering::SeqCst);
        if self.0.faults.lock().terminate {
            return Err(EngineError::new("injected terminate failure"));
        }
        Ok(())
    }

    async fn version(&self) -> EngineResult<String> {
        self.0.check_live()?;
        Ok("memory-1.0".to_string())
    }
}

pub struct MemoryConnection {
    engine: Arc<MemoryEngine>,
}

#[async_trait]
impl EngineConnection for MemoryConnection {
    async fn query(&self, sql: &str) -> EngineResult<ResultSet> {
        tokio::task::yield_now().await;
        self.engine.run(sql)
    }

    async fn bulk_insert(&self, data: &InsertData, options: &InsertOptions) -> EngineResult<()> {
        let gate = self.engine.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.engine.check_live()?;
        let key = qualified(&options.schema, &options.name);
        self.engine
            .record(format!("INSERT {} create={}", key, options.create));
        if self.engine.faults.lock().bulk_insert {
            return Err(EngineError::new("injected insert failure"));
        }
        let rows = match data {
            InsertData::Json(Value::Array(rows)) => rows.len(),
            InsertData::Json(_) => 1,
            InsertData::Bytes(bytes) => serde_json::from_slice::<Vec<Value>>(bytes)
                .map(|rows| rows.len())
                .map_err(|e| EngineError::new(e.to_string()))?,
        };
        let mut tables = self.engine.tables.lock();
        match (options.create, tables.contains_key(&key)) {
            (true, true) => Err(EngineError::entry_already_exists(&options.name)),
            (false, false) => Err(EngineError::new(format!("no such table: {}", key))),
            _ => {
                *tables.entry(key).or_insert(0) += rows;
                Ok(())
            }
        }
    }
}

/// Hands out the shared [`MemoryEngine`] on every instantiation
pub struct MemoryEngineFactory {
    pub engine: Arc<MemoryEngine>,
}

impl MemoryEngineFactory {
    pub fn new() -> (Arc<Self>, Arc<MemoryEngine>) {
        let engine = MemoryEngine::new();
        (
            Arc::new(Self {
                engine: Arc::clone(&engine),
            }),
            engine,
        )
    }
}

#[async_trait]
impl EngineFactory for MemoryEngineFactory {
    async fn instantiate(
        &self,
        _params: &EngineInitParams,
        progress: Option<ProgressHandler>,
    ) -> EngineResult<EngineRef> {
        if self.engine.faults.lock().instantiate {
            return Err(EngineError::new("injected instantiate failure"));
        }
        self.engine.instantiations.fetch_add(1, Ordering::SeqCst);
        self.engine.terminated.store(false, Ordering::SeqCst);
        if let Some(progress) = progress {
            progress(InstantiationProgress {
                bytes_loaded: 1,
                bytes_total: 1,
            });
        }
        Ok(Arc::new(SharedEngine(Arc::clone(&self.engine))))
    }
}

pub fn session(tables: Vec<TableDefinition>) -> SessionConfig {
    SessionConfig::new(EngineInitParams::default(), tables)
}

/// A connected session over a fresh [`MemoryEngine`]
pub async fn connected(tables: Vec<TableDefinition>) -> (DatabaseHandle, Arc<MemoryEngine>) {
    let (factory, engine) = MemoryEngineFactory::new();
    let db = DatabaseHandle::spawn(factory);
    db.configure(session(tables), EngineHooks::default())
        .await
        .unwrap();
    db.connect().await.unwrap();
    (db, engine)
}

/// Upper bound for waits that should resolve promptly
pub const WAIT: Duration = Duration::from_secs(5);

pub fn rows(n: usize) -> Value {
    Value::Array((0..n).map(|i| serde_json::json!({ "i": i })).collect())
}
