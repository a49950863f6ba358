//! Connection lifecycle controller actor
//!
//! Owns the engine handle and the dedicated transaction connection. Engine
//! calls run in spawned tasks; while one is outstanding the controller sits
//! in a transient state (`Initializing`, `QueryOneShot`, a transaction step
//! or `Disconnected`) and rejects commands that state does not accept.

use super::command::{LifecycleCommand, QueryOutput, QueryRequest};
use super::state::{ControllerView, LifecycleState, TransactionState};
use super::work::{self, Finish};
use crate::catalog::{CatalogHandle, CatalogRequest, Reply};
use duckling_core::config::SessionConfig;
use duckling_core::engine::{
    ConnectionRef, EngineFactory, EngineHooks, EngineRef, EngineResult, InitStatus, ResultSet,
};
use duckling_core::errors::{DucklingError, Result};
use duckling_core::{log_op_end, log_op_error, log_op_start};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

const OP_CONFIGURE: &str = "lifecycle.configure";
const OP_CONNECT: &str = "lifecycle.connect";
const OP_DISCONNECT: &str = "lifecycle.disconnect";
const OP_RESET: &str = "lifecycle.reset";
const OP_QUERY: &str = "lifecycle.query";
const OP_BEGIN: &str = "lifecycle.transaction.begin";
const OP_EXECUTE: &str = "lifecycle.transaction.execute";
const OP_COMMIT: &str = "lifecycle.transaction.commit";
const OP_ROLLBACK: &str = "lifecycle.transaction.rollback";

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn log_outcome<T>(op: &'static str, started: Instant, result: &Result<T>) {
    match result {
        Ok(_) => log_op_end!(op, duration_ms = elapsed_ms(started)),
        Err(err) => log_op_error!(op, err, duration_ms = elapsed_ms(started)),
    }
}

/// What happens once the engine has been terminated
enum AfterTeardown {
    Settle(Reply<()>),
    Reconnect(Reply<String>),
}

/// The engine call currently outstanding
enum InFlight {
    Connect {
        started: Instant,
        reply: Reply<String>,
    },
    Teardown {
        op: &'static str,
        started: Instant,
        then: AfterTeardown,
    },
    Query {
        started: Instant,
        reply: Reply<QueryOutput>,
    },
    Begin {
        started: Instant,
        reply: Reply<()>,
    },
    Execute {
        started: Instant,
        reply: Reply<ResultSet>,
    },
    Finish {
        how: Finish,
        started: Instant,
        reply: Reply<()>,
    },
}

enum Completion {
    Initialized(Result<(EngineRef, String)>),
    Terminated(EngineResult<()>),
    Queried(Result<QueryOutput>),
    Began(Result<ConnectionRef>),
    Executed(Result<ResultSet>),
    Finished(Result<()>),
}

pub(crate) struct LifecycleActor {
    state: LifecycleState,
    factory: Arc<dyn EngineFactory>,
    config: Option<SessionConfig>,
    hooks: EngineHooks,
    engine: Option<EngineRef>,
    engine_version: Option<String>,
    tx_conn: Option<ConnectionRef>,
    last_error: Option<DucklingError>,
    in_flight: Option<InFlight>,
    catalog: CatalogHandle,
    commands: mpsc::Receiver<LifecycleCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    view_tx: watch::Sender<ControllerView>,
}

impl LifecycleActor {
    pub(crate) fn new(
        factory: Arc<dyn EngineFactory>,
        catalog: CatalogHandle,
        commands: mpsc::Receiver<LifecycleCommand>,
        view_tx: watch::Sender<ControllerView>,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        Self {
            state: LifecycleState::Idle,
            factory,
            config: None,
            hooks: EngineHooks::default(),
            engine: None,
            engine_version: None,
            tx_conn: None,
            last_error: None,
            in_flight: None,
            catalog,
            commands,
            completions_tx,
            completions,
            view_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!("Lifecycle actor started");
        loop {
            tokio::select! {
                biased;
                Some(done) = self.completions.recv() => self.on_completion(done).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
            self.publish();
        }
        self.shutdown().await;
        tracing::debug!("Lifecycle actor stopped");
    }

    fn view(&self) -> ControllerView {
        ControllerView {
            state: self.state,
            engine_version: self.engine_version.clone(),
            has_transaction: self.tx_conn.is_some(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }

    fn settle<T>(&self, reply: Reply<T>, result: Result<T>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn transition(&mut self, to: LifecycleState) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, "Lifecycle state transition");
            self.state = to;
        }
    }

    fn rejected(&self, command: &str) -> DucklingError {
        tracing::warn!(state = %self.state, command, "Lifecycle command rejected");
        DucklingError::invalid_transition(self.state.name(), command)
    }

    fn spawn<F>(&self, work: F)
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = done.send(work.await);
        });
    }

    fn connected_engine(&self) -> Option<EngineRef> {
        match self.state {
            LifecycleState::Connected => self.engine.clone(),
            _ => None,
        }
    }

    async fn handle(&mut self, command: LifecycleCommand) {
        let name = command.name();
        match command {
            LifecycleCommand::Configure {
                config,
                hooks,
                reply,
            } => {
                let started = Instant::now();
                log_op_start!(OP_CONFIGURE, table_count = config.tables.len());
                let result = self.configure(config, hooks).await;
                log_outcome(OP_CONFIGURE, started, &result);
                self.settle(reply, result);
            }
            LifecycleCommand::Connect { reply } => {
                if self.state == LifecycleState::Configured {
                    self.start_connect(reply);
                } else {
                    let err = self.rejected(name);
                    self.settle(reply, Err(err));
                }
            }
            LifecycleCommand::Disconnect { reply } => {
                if self.state == LifecycleState::Connected {
                    self.start_teardown(OP_DISCONNECT, AfterTeardown::Settle(reply))
                        .await;
                } else {
                    let err = self.rejected(name);
                    self.settle(reply, Err(err));
                }
            }
            LifecycleCommand::Reconnect { reply } => {
                if self.state == LifecycleState::Connected {
                    self.start_teardown(OP_DISCONNECT, AfterTeardown::Reconnect(reply))
                        .await;
                } else {
                    let err = self.rejected(name);
                    self.settle(reply, Err(err));
                }
            }
            LifecycleCommand::Reset { reply } => self.reset(name, reply).await,
            LifecycleCommand::ExecuteQuery { request, reply } => match self.connected_engine() {
                Some(engine) => self.start_query(engine, request, reply),
                None => {
                    let err = self.rejected(name);
                    self.settle(reply, Err(err));
                }
            },
            LifecycleCommand::BeginTransaction { reply } => match self.connected_engine() {
                Some(engine) => {
                    log_op_start!(OP_BEGIN);
                    self.transition(LifecycleState::Transaction(TransactionState::Begin));
                    self.in_flight = Some(InFlight::Begin {
                        started: Instant::now(),
                        reply,
                    });
                    let catalog = self.catalog.clone();
                    self.spawn(async move {
                        Completion::Began(work::begin(engine, catalog).await)
                    });
                }
                None => {
                    let err = self.rejected(name);
                    self.settle(reply, Err(err));
                }
            },
            LifecycleCommand::ExecuteInTransaction { sql, reply } => {
                match (self.state, self.tx_conn.clone()) {
                    (
                        LifecycleState::Transaction(TransactionState::WithinTransaction),
                        Some(conn),
                    ) => {
                        log_op_start!(OP_EXECUTE);
                        self.transition(LifecycleState::Transaction(TransactionState::Execute));
                        self.in_flight = Some(InFlight::Execute {
                            started: Instant::now(),
                            reply,
                        });
                        self.spawn(async move {
                            Completion::Executed(work::execute(conn, sql).await)
                        });
                    }
                    _ => {
                        let err = self.rejected(name);
                        self.settle(reply, Err(err));
                    }
                }
            }
            LifecycleCommand::Commit { reply } => self.start_finish(name, Finish::Commit, reply),
            LifecycleCommand::Rollback { reply } => {
                self.start_finish(name, Finish::Rollback, reply)
            }
            LifecycleCommand::Catalog(request) => self.forward(request).await,
        }
    }

    async fn configure(&mut self, config: SessionConfig, hooks: EngineHooks) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(self.rejected("CONFIGURE"));
        }
        config.validate()?;
        self.catalog.configure(config.tables.clone()).await?;
        self.config = Some(config);
        self.hooks = hooks;
        self.transition(LifecycleState::Configured);
        Ok(())
    }

    fn start_connect(&mut self, reply: Reply<String>) {
        let params = self
            .config
            .as_ref()
            .map(|c| c.engine.clone())
            .unwrap_or_default();
        log_op_start!(OP_CONNECT, log_level = ?params.log_level);
        self.transition(LifecycleState::Initializing);
        self.hooks.notify_status(InitStatus::Initializing);
        self.in_flight = Some(InFlight::Connect {
            started: Instant::now(),
            reply,
        });

        let factory = Arc::clone(&self.factory);
        let hooks = self.hooks.clone();
        self.spawn(async move {
            Completion::Initialized(work::initialize(factory, params, hooks).await)
        });
    }

    /// Tell the catalog to drop its connected state, if it has any
    async fn disconnect_catalog(&self) {
        if !self.catalog.state().accepts_disconnect() {
            return;
        }
        if let Err(err) = self.catalog.disconnect().await {
            tracing::warn!(error = %err, "Catalog disconnect failed");
        }
    }

    async fn start_teardown(&mut self, op: &'static str, then: AfterTeardown) {
        log_op_start!(op, from = %self.state);
        let started = Instant::now();
        self.disconnect_catalog().await;
        self.engine_version = None;
        if let Some(conn) = self.tx_conn.take() {
            if let Err(err) = conn.close().await {
                tracing::debug!(error = %err, "Closing abandoned transaction connection failed");
            }
        }
        match self.engine.take() {
            Some(engine) => {
                self.transition(LifecycleState::Disconnected);
                self.in_flight = Some(InFlight::Teardown { op, started, then });
                self.spawn(async move { Completion::Terminated(engine.terminate().await) });
            }
            None => self.finish_teardown(op, started, then),
        }
    }

    fn finish_teardown(&mut self, op: &'static str, started: Instant, then: AfterTeardown) {
        self.transition(LifecycleState::Configured);
        log_op_end!(op, duration_ms = elapsed_ms(started));
        match then {
            AfterTeardown::Settle(reply) => self.settle(reply, Ok(())),
            AfterTeardown::Reconnect(reply) => self.start_connect(reply),
        }
    }

    async fn reset(&mut self, name: &str, reply: Reply<()>) {
        match self.state {
            LifecycleState::Configured => {
                let started = Instant::now();
                log_op_start!(OP_RESET, from = %self.state);
                let result = self.catalog.reset().await;
                if result.is_ok() {
                    self.config = None;
                    self.hooks = EngineHooks::default();
                    self.last_error = None;
                    self.transition(LifecycleState::Idle);
                }
                log_outcome(OP_RESET, started, &result);
                self.settle(reply, result);
            }
            LifecycleState::Error => {
                self.last_error = None;
                self.start_teardown(OP_RESET, AfterTeardown::Settle(reply))
                    .await;
            }
            _ => {
                let err = self.rejected(name);
                self.settle(reply, Err(err));
            }
        }
    }

    fn start_query(&mut self, engine: EngineRef, request: QueryRequest, reply: Reply<QueryOutput>) {
        log_op_start!(OP_QUERY, description = %request.description);
        self.transition(LifecycleState::QueryOneShot);
        self.in_flight = Some(InFlight::Query {
            started: Instant::now(),
            reply,
        });
        self.spawn(async move { Completion::Queried(work::run_query(engine, request).await) });
    }

    fn start_finish(&mut self, name: &str, how: Finish, reply: Reply<()>) {
        let conn = match (self.state, self.tx_conn.take()) {
            (LifecycleState::Transaction(TransactionState::WithinTransaction), Some(conn)) => conn,
            (_, conn) => {
                self.tx_conn = conn;
                let err = self.rejected(name);
                self.settle(reply, Err(err));
                return;
            }
        };
        let (op, step) = match how {
            Finish::Commit => (OP_COMMIT, TransactionState::Commit),
            Finish::Rollback => (OP_ROLLBACK, TransactionState::Rollback),
        };
        log_op_start!(op);
        self.transition(LifecycleState::Transaction(step));
        self.in_flight = Some(InFlight::Finish {
            how,
            started: Instant::now(),
            reply,
        });
        self.spawn(async move { Completion::Finished(work::finish(conn, how).await) });
    }

    async fn forward(&mut self, request: CatalogRequest) {
        let Some(engine) = self.connected_engine() else {
            let err = self.rejected(request.name());
            request.reject(err);
            return;
        };
        tracing::debug!(command = request.name(), "Forwarding to catalog");
        if let Err(err) = self.catalog.send(request.attach(&engine)).await {
            tracing::error!(error = %err, "Catalog unavailable");
        }
    }

    /// Leave the transaction sub-machine after a failed step
    fn abort_transaction(&mut self, err: &DucklingError) {
        self.tx_conn = None;
        self.last_error = Some(err.clone());
        self.transition(LifecycleState::Transaction(TransactionState::Error));
        self.transition(LifecycleState::Transaction(TransactionState::End));
        self.transition(LifecycleState::Connected);
    }

    fn end_transaction(&mut self) {
        self.tx_conn = None;
        self.transition(LifecycleState::Transaction(TransactionState::End));
        self.transition(LifecycleState::Connected);
    }

    async fn on_completion(&mut self, done: Completion) {
        let Some(in_flight) = self.in_flight.take() else {
            tracing::debug!("Completion with nothing in flight");
            return;
        };
        match (done, in_flight) {
            (Completion::Initialized(result), InFlight::Connect { started, reply }) => {
                self.on_initialized(result, started, reply).await;
            }
            (Completion::Terminated(result), InFlight::Teardown { op, started, then }) => {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "Engine terminate failed");
                }
                self.finish_teardown(op, started, then);
            }
            (Completion::Queried(result), InFlight::Query { started, reply }) => {
                log_outcome(OP_QUERY, started, &result);
                match &result {
                    Ok(output) => {
                        tracing::debug!(row_count = output.row_count(), "Query complete");
                        self.transition(LifecycleState::Connected);
                    }
                    Err(err) => {
                        self.last_error = Some(err.clone());
                        self.transition(LifecycleState::Error);
                    }
                }
                self.settle(reply, result);
            }
            (Completion::Began(result), InFlight::Begin { started, reply }) => {
                log_outcome(OP_BEGIN, started, &result);
                match result {
                    Ok(conn) => {
                        self.tx_conn = Some(conn);
                        self.transition(LifecycleState::Transaction(
                            TransactionState::WithinTransaction,
                        ));
                        self.settle(reply, Ok(()));
                    }
                    Err(err) => {
                        self.abort_transaction(&err);
                        self.settle(reply, Err(err));
                    }
                }
            }
            (Completion::Executed(result), InFlight::Execute { started, reply }) => {
                log_outcome(OP_EXECUTE, started, &result);
                match &result {
                    Ok(_) => self.transition(LifecycleState::Transaction(
                        TransactionState::WithinTransaction,
                    )),
                    Err(err) => self.abort_transaction(err),
                }
                self.settle(reply, result);
            }
            (Completion::Finished(result), InFlight::Finish { how, started, reply }) => {
                let op = match how {
                    Finish::Commit => OP_COMMIT,
                    Finish::Rollback => OP_ROLLBACK,
                };
                log_outcome(op, started, &result);
                match &result {
                    Ok(()) => self.end_transaction(),
                    Err(err) => self.abort_transaction(err),
                }
                self.settle(reply, result);
            }
            (_, in_flight) => {
                tracing::error!("Completion does not match the in-flight engine call");
                self.in_flight = Some(in_flight);
            }
        }
    }

    async fn on_initialized(
        &mut self,
        result: Result<(EngineRef, String)>,
        started: Instant,
        reply: Reply<String>,
    ) {
        let result = match result {
            Ok((engine, version)) => {
                self.engine = Some(engine);
                self.catalog.connect().await.map(|()| version)
            }
            Err(err) => Err(err),
        };
        log_outcome(OP_CONNECT, started, &result);
        match &result {
            Ok(version) => {
                tracing::info!(engine_version = %version, "Engine ready");
                self.engine_version = Some(version.clone());
                self.last_error = None;
                self.transition(LifecycleState::Connected);
                self.hooks.notify_status(InitStatus::Ready);
            }
            Err(err) => {
                self.last_error = Some(err.clone());
                self.transition(LifecycleState::Error);
                self.hooks.notify_status(InitStatus::Error);
            }
        }
        self.settle(reply, result);
    }

    async fn shutdown(&mut self) {
        if let Some(conn) = self.tx_conn.take() {
            let _ = conn.close().await;
        }
        if let Some(engine) = self.engine.take() {
            if let Err(err) = engine.terminate().await {
                tracing::debug!(error = %err, "Terminate on shutdown failed");
            }
        }
        self.disconnect_catalog().await;
    }
}
