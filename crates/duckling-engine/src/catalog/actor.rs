//! Catalog orchestrator actor
//!
//! A single task owns the catalog state. Commands arrive on a bounded
//! channel; engine work (load, prune, drop) runs in spawned tasks that
//! report back on an internal completion channel. At most one structural
//! mutation is in flight, and the next queued one is started only after the
//! driving loop sees the catalog back in `Connected`.

use super::command::{CatalogCommand, Reply};
use super::state::{CatalogSnapshot, CatalogState};
use duckling_core::config::validate_table_definitions;
use duckling_core::engine::EngineRef;
use duckling_core::errors::{DucklingError, Result};
use duckling_core::model::{
    find_definition, CatalogSubscription, LoadedTableEntry, PendingTableLoad, TableDefinition,
    TableMetadata,
};
use duckling_core::ops::{drop_table, load_table, prune_versions, LoadInput};
use duckling_core::{log_op_end, log_op_error, log_op_start};
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

const OP_CONFIGURE: &str = "catalog.configure";
const OP_CONNECT: &str = "catalog.connect";
const OP_DISCONNECT: &str = "catalog.disconnect";
const OP_RESET: &str = "catalog.reset";
const OP_LOAD: &str = "catalog.load_table";
const OP_DROP: &str = "catalog.drop_table";
const OP_SUBSCRIBE: &str = "catalog.subscribe";

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn log_outcome<T>(op: &'static str, started: Instant, result: &Result<T>) {
    match result {
        Ok(_) => log_op_end!(op, duration_ms = elapsed_ms(started)),
        Err(err) => log_op_error!(op, err, duration_ms = elapsed_ms(started)),
    }
}

/// A structural mutation waiting its turn
enum PendingMutation {
    Load {
        request: PendingTableLoad,
        engine: EngineRef,
        reply: Reply<LoadedTableEntry>,
    },
    Drop {
        definition: TableDefinition,
        engine: EngineRef,
        reply: Reply<()>,
    },
}

impl PendingMutation {
    fn cancel(self, reason: &str) {
        match self {
            PendingMutation::Load { reply, .. } => {
                let _ = reply.send(Err(DucklingError::cancelled(reason)));
            }
            PendingMutation::Drop { reply, .. } => {
                let _ = reply.send(Err(DucklingError::cancelled(reason)));
            }
        }
    }
}

enum Work {
    Load {
        table_spec_name: String,
        version_id: u64,
        reply: Reply<LoadedTableEntry>,
        /// Set once the load succeeded and retention is running
        entry: Option<LoadedTableEntry>,
    },
    Drop {
        table_spec_name: String,
        reply: Reply<()>,
    },
}

impl Work {
    fn table_spec_name(&self) -> &str {
        match self {
            Work::Load {
                table_spec_name, ..
            }
            | Work::Drop {
                table_spec_name, ..
            } => table_spec_name,
        }
    }

    fn fail(self, err: DucklingError) {
        match self {
            Work::Load { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            Work::Drop { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// The mutation currently executing against the engine
struct InFlight {
    generation: u64,
    started: Instant,
    /// Held for the duration of the cycle only
    engine: EngineRef,
    work: Work,
}

enum Completion {
    Loaded {
        generation: u64,
        result: Result<LoadedTableEntry>,
    },
    Pruned {
        generation: u64,
        result: Result<Vec<LoadedTableEntry>>,
    },
    Dropped {
        generation: u64,
        result: Result<Vec<LoadedTableEntry>>,
    },
}

impl Completion {
    fn generation(&self) -> u64 {
        match self {
            Completion::Loaded { generation, .. }
            | Completion::Pruned { generation, .. }
            | Completion::Dropped { generation, .. } => *generation,
        }
    }
}

pub(crate) struct CatalogActor {
    state: CatalogState,
    table_definitions: Vec<TableDefinition>,
    loaded_versions: Vec<LoadedTableEntry>,
    next_table_id: u64,
    queue: VecDeque<PendingMutation>,
    current: Option<InFlight>,
    subscriptions: Vec<CatalogSubscription>,
    /// Bumped by disconnect and reset; completions from older generations are dropped
    generation: u64,
    last_error: Option<DucklingError>,
    commands: mpsc::Receiver<CatalogCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<CatalogSnapshot>,
}

impl CatalogActor {
    pub(crate) fn new(
        commands: mpsc::Receiver<CatalogCommand>,
        snapshot_tx: watch::Sender<CatalogSnapshot>,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        Self {
            state: CatalogState::Idle,
            table_definitions: Vec::new(),
            loaded_versions: Vec::new(),
            next_table_id: 1,
            queue: VecDeque::new(),
            current: None,
            subscriptions: Vec::new(),
            generation: 0,
            last_error: None,
            commands,
            completions_tx,
            completions,
            snapshot_tx,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!("Catalog actor started");
        loop {
            tokio::select! {
                biased;
                Some(done) = self.completions.recv() => self.on_completion(done),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
            self.advance();
            self.publish();
        }
        self.cancel_all("catalog shut down");
        tracing::debug!("Catalog actor stopped");
    }

    fn snapshot(&self) -> CatalogSnapshot {
        CatalogSnapshot {
            state: self.state,
            table_definitions: self.table_definitions.clone(),
            loaded_versions: self.loaded_versions.clone(),
            next_table_id: self.next_table_id,
            queue_len: self.queue.len(),
            current_table: self
                .current
                .as_ref()
                .map(|c| c.work.table_spec_name().to_string()),
            subscription_ids: self
                .subscriptions
                .iter()
                .map(|s| s.id().to_string())
                .collect(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Publish, then answer; a caller woken by the reply sees the new state
    fn settle<T>(&self, reply: Reply<T>, result: Result<T>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn transition(&mut self, to: CatalogState) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, "Catalog state transition");
            self.state = to;
        }
    }

    fn rejected(&self, command: &str) -> DucklingError {
        tracing::warn!(state = %self.state, command, "Catalog command rejected");
        DucklingError::invalid_transition(self.state.name(), command)
    }

    fn fail(&mut self, err: DucklingError) {
        self.last_error = Some(err);
        self.transition(CatalogState::Error);
    }

    fn handle(&mut self, command: CatalogCommand) {
        let name = command.name();
        match command {
            CatalogCommand::Configure {
                table_definitions,
                reply,
            } => {
                let started = Instant::now();
                log_op_start!(OP_CONFIGURE, table_count = table_definitions.len());
                let result = self.configure(table_definitions);
                log_outcome(OP_CONFIGURE, started, &result);
                self.settle(reply, result);
            }
            CatalogCommand::Connect { reply } => {
                let started = Instant::now();
                log_op_start!(OP_CONNECT);
                let result = if self.state == CatalogState::Configured {
                    self.transition(CatalogState::Connected);
                    Ok(())
                } else {
                    Err(self.rejected(name))
                };
                log_outcome(OP_CONNECT, started, &result);
                self.settle(reply, result);
            }
            CatalogCommand::Disconnect { reply } => {
                let started = Instant::now();
                log_op_start!(OP_DISCONNECT);
                let result = if self.state.accepts_disconnect() {
                    self.cancel_all("catalog disconnected");
                    self.last_error = None;
                    self.transition(CatalogState::Configured);
                    Ok(())
                } else {
                    Err(self.rejected(name))
                };
                log_outcome(OP_DISCONNECT, started, &result);
                self.settle(reply, result);
            }
            CatalogCommand::Reset { reply } => {
                let started = Instant::now();
                log_op_start!(OP_RESET);
                let result = self.reset(name);
                log_outcome(OP_RESET, started, &result);
                self.settle(reply, result);
            }
            CatalogCommand::ListTables { reply } => {
                self.settle(reply, Ok(self.loaded_versions.clone()));
            }
            CatalogCommand::ListDefinitions { reply } => {
                self.settle(reply, Ok(self.table_definitions.clone()));
            }
            CatalogCommand::GetTableMetadata {
                table_spec_name,
                reply,
            } => {
                let metadata = TableMetadata::from_entries(&table_spec_name, &self.loaded_versions);
                self.settle(reply, Ok(metadata));
            }
            CatalogCommand::LoadTable {
                request,
                engine,
                reply,
            } => {
                if matches!(self.state, CatalogState::Idle | CatalogState::Error) {
                    let err = self.rejected(name);
                    self.settle(reply, Err(err));
                    return;
                }
                tracing::debug!(
                    table_spec_name = %request.table_spec_name,
                    request_id = %request.request_id,
                    queue_len = self.queue.len() + 1,
                    "Load queued"
                );
                self.queue.push_back(PendingMutation::Load {
                    request,
                    engine,
                    reply,
                });
            }
            CatalogCommand::DropTable {
                table_spec_name,
                engine,
                reply,
            } => {
                if matches!(self.state, CatalogState::Idle | CatalogState::Error) {
                    let err = self.rejected(name);
                    self.settle(reply, Err(err));
                    return;
                }
                match find_definition(&self.table_definitions, &table_spec_name) {
                    Some(definition) => {
                        tracing::debug!(%table_spec_name, "Drop queued");
                        self.queue.push_back(PendingMutation::Drop {
                            definition: definition.clone(),
                            engine,
                            reply,
                        });
                    }
                    None => self.settle(
                        reply,
                        Err(DucklingError::TableDefinitionNotFound { table_spec_name }),
                    ),
                }
            }
            CatalogCommand::Subscribe {
                subscription,
                reply,
            } => {
                self.subscribe(subscription);
                self.settle(reply, Ok(()));
            }
            CatalogCommand::Unsubscribe {
                subscription_id,
                reply,
            } => {
                let before = self.subscriptions.len();
                self.subscriptions.retain(|s| s.id() != subscription_id);
                let removed = self.subscriptions.len() < before;
                tracing::debug!(%subscription_id, removed, "Unsubscribed");
                self.settle(reply, Ok(removed));
            }
            CatalogCommand::ForceNotify {
                subscription_id,
                reply,
            } => {
                let notified = self.force_notify(&subscription_id);
                self.settle(reply, Ok(notified));
            }
        }
    }

    fn configure(&mut self, table_definitions: Vec<TableDefinition>) -> Result<()> {
        if self.state != CatalogState::Idle {
            return Err(self.rejected("CATALOG.CONFIGURE"));
        }
        validate_table_definitions(&table_definitions)?;
        self.table_definitions = table_definitions;
        self.transition(CatalogState::Configured);
        Ok(())
    }

    fn reset(&mut self, name: &str) -> Result<()> {
        if !matches!(self.state, CatalogState::Configured | CatalogState::Error) {
            return Err(self.rejected(name));
        }
        self.cancel_all("catalog reset");
        self.table_definitions.clear();
        self.loaded_versions.clear();
        self.subscriptions.clear();
        self.last_error = None;
        // The version counter is kept so ids stay unique across sessions
        self.transition(CatalogState::Idle);
        Ok(())
    }

    fn cancel_all(&mut self, reason: &str) {
        self.generation += 1;
        let mut cancelled = self.queue.len();
        if let Some(current) = self.current.take() {
            cancelled += 1;
            // A dispatched load may still create its table; its id is spent
            if matches!(current.work, Work::Load { entry: None, .. }) {
                self.next_table_id += 1;
            }
            current.work.fail(DucklingError::cancelled(reason));
        }
        for pending in self.queue.drain(..) {
            pending.cancel(reason);
        }
        if cancelled > 0 {
            tracing::info!(cancelled, reason, "Cancelled catalog mutations");
        }
    }

    fn subscribe(&mut self, subscription: CatalogSubscription) {
        let started = Instant::now();
        let id = subscription.id().to_string();
        log_op_start!(OP_SUBSCRIBE, subscription_id = %id, table_spec_name = %subscription.table_spec_name);
        if let Some(on_subscribe) = &subscription.on_subscribe {
            on_subscribe(&id, &subscription.table_spec_name);
        }
        match self.subscriptions.iter_mut().find(|s| s.id() == id) {
            Some(existing) => {
                tracing::debug!(subscription_id = %id, "Replacing existing subscription");
                *existing = subscription;
            }
            None => self.subscriptions.push(subscription),
        }
        log_op_end!(OP_SUBSCRIBE, duration_ms = elapsed_ms(started));
    }

    fn notify(&self, entry: &LoadedTableEntry) {
        let mut notified = 0usize;
        for subscription in self
            .subscriptions
            .iter()
            .filter(|s| s.table_spec_name == entry.table_spec_name)
        {
            (subscription.on_change)(
                &entry.table_instance_name,
                entry.table_version_id,
                entry.table_is_versioned,
            );
            notified += 1;
        }
        if notified > 0 {
            tracing::debug!(
                table_instance_name = %entry.table_instance_name,
                notified,
                "Notified subscribers"
            );
        }
    }

    fn force_notify(&self, subscription_id: &str) -> bool {
        let Some(subscription) = self.subscriptions.iter().find(|s| s.id() == subscription_id)
        else {
            tracing::debug!(subscription_id, "Force notify for unknown subscription");
            return false;
        };
        let latest = self
            .loaded_versions
            .iter()
            .filter(|e| e.table_spec_name == subscription.table_spec_name)
            .max_by_key(|e| e.table_version_id);
        match latest {
            Some(entry) => {
                (subscription.on_change)(
                    &entry.table_instance_name,
                    entry.table_version_id,
                    entry.table_is_versioned,
                );
                true
            }
            None => false,
        }
    }

    /// Start the next queued mutation when connected and idle
    fn advance(&mut self) {
        if self.state != CatalogState::Connected || self.current.is_some() {
            return;
        }
        match self.queue.pop_front() {
            Some(PendingMutation::Load {
                request,
                engine,
                reply,
            }) => self.start_load(request, engine, reply),
            Some(PendingMutation::Drop {
                definition,
                engine,
                reply,
            }) => self.start_drop(definition, engine, reply),
            None => {}
        }
    }

    fn start_load(
        &mut self,
        request: PendingTableLoad,
        engine: EngineRef,
        reply: Reply<LoadedTableEntry>,
    ) {
        let version_id = self.next_table_id;
        log_op_start!(
            OP_LOAD,
            table_spec_name = %request.table_spec_name,
            table_version_id = version_id,
            request_id = %request.request_id,
            queue_len = self.queue.len()
        );
        self.transition(CatalogState::LoadingTable);

        let generation = self.generation;
        let definitions = self.table_definitions.clone();
        let task_engine = EngineRef::clone(&engine);
        let done = self.completions_tx.clone();
        let table_spec_name = request.table_spec_name.clone();
        tokio::spawn(async move {
            let input = LoadInput {
                next_table_id: version_id,
                table_definitions: &definitions,
                request: &request,
            };
            let result = load_table(task_engine.as_ref(), input).await;
            let _ = done.send(Completion::Loaded { generation, result });
        });

        self.current = Some(InFlight {
            generation,
            started: Instant::now(),
            engine,
            work: Work::Load {
                table_spec_name,
                version_id,
                reply,
                entry: None,
            },
        });
    }

    fn start_prune(&self, engine: &EngineRef) {
        let generation = self.generation;
        let loaded = self.loaded_versions.clone();
        let definitions = self.table_definitions.clone();
        let task_engine = EngineRef::clone(engine);
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = prune_versions(task_engine.as_ref(), &loaded, &definitions).await;
            let _ = done.send(Completion::Pruned { generation, result });
        });
    }

    fn start_drop(&mut self, definition: TableDefinition, engine: EngineRef, reply: Reply<()>) {
        log_op_start!(OP_DROP, table_spec_name = %definition.name);
        self.transition(CatalogState::DroppingTable);

        let generation = self.generation;
        let loaded = self.loaded_versions.clone();
        let task_engine = EngineRef::clone(&engine);
        let done = self.completions_tx.clone();
        let table_spec_name = definition.name.clone();
        tokio::spawn(async move {
            let result = drop_table(task_engine.as_ref(), &definition, &loaded).await;
            let _ = done.send(Completion::Dropped { generation, result });
        });

        self.current = Some(InFlight {
            generation,
            started: Instant::now(),
            engine,
            work: Work::Drop {
                table_spec_name,
                reply,
            },
        });
    }

    fn on_completion(&mut self, done: Completion) {
        let generation = done.generation();
        let current = match self.current.take() {
            Some(current) if current.generation == generation && generation == self.generation => {
                current
            }
            other => {
                self.current = other;
                tracing::debug!(generation, "Discarding stale completion");
                return;
            }
        };
        let InFlight {
            started,
            engine,
            work,
            ..
        } = current;

        match (done, work) {
            (
                Completion::Loaded { result, .. },
                Work::Load {
                    table_spec_name,
                    version_id,
                    reply,
                    entry: None,
                },
            ) => {
                // Consumed whether or not the load succeeded
                self.next_table_id += 1;
                match result {
                    Ok(entry) => {
                        self.loaded_versions.insert(0, entry.clone());
                        self.notify(&entry);
                        self.transition(CatalogState::PruningVersions);
                        self.start_prune(&engine);
                        self.current = Some(InFlight {
                            generation,
                            started,
                            engine,
                            work: Work::Load {
                                table_spec_name,
                                version_id,
                                reply,
                                entry: Some(entry),
                            },
                        });
                    }
                    Err(err) => {
                        log_op_error!(
                            OP_LOAD,
                            &err,
                            duration_ms = elapsed_ms(started),
                            table_spec_name = %table_spec_name,
                            table_version_id = version_id
                        );
                        self.fail(err.clone());
                        self.settle(reply, Err(err));
                    }
                }
            }
            (
                Completion::Pruned { result, .. },
                Work::Load {
                    reply,
                    entry: Some(entry),
                    ..
                },
            ) => match result {
                Ok(retained) => {
                    self.loaded_versions = retained;
                    self.transition(CatalogState::Connected);
                    log_op_end!(
                        OP_LOAD,
                        duration_ms = elapsed_ms(started),
                        table_instance_name = %entry.table_instance_name,
                        table_version_id = entry.table_version_id
                    );
                    self.settle(reply, Ok(entry));
                }
                Err(err) => {
                    log_op_error!(
                        OP_LOAD,
                        &err,
                        duration_ms = elapsed_ms(started),
                        table_instance_name = %entry.table_instance_name
                    );
                    self.fail(err.clone());
                    self.settle(reply, Err(err));
                }
            },
            (Completion::Dropped { result, .. }, Work::Drop { table_spec_name, reply }) => {
                match result {
                    Ok(survivors) => {
                        self.loaded_versions = survivors;
                        self.transition(CatalogState::Connected);
                        log_op_end!(
                            OP_DROP,
                            duration_ms = elapsed_ms(started),
                            table_spec_name = %table_spec_name
                        );
                        self.settle(reply, Ok(()));
                    }
                    Err(err) => {
                        log_op_error!(OP_DROP, &err, duration_ms = elapsed_ms(started));
                        self.fail(err.clone());
                        self.settle(reply, Err(err));
                    }
                }
            }
            (_, work) => {
                let err = DucklingError::Internal {
                    message: "completion does not match the in-flight mutation".to_string(),
                };
                tracing::error!(error = %err, "Catalog bookkeeping mismatch");
                work.fail(err.clone());
                self.fail(err);
            }
        }
    }
}
