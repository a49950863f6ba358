//! Pruner: enforce version retention and drop logical tables

use crate::engine::{EngineConnection, EngineInstance, EngineResult};
use crate::errors::{DucklingError, Result};
use crate::model::{find_definition, LoadedTableEntry, TableDefinition};
use std::collections::HashSet;

/// Split of loaded versions into those kept and those to drop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    /// Surviving entries, original order preserved
    pub retained: Vec<LoadedTableEntry>,
    pub dropped: Vec<LoadedTableEntry>,
}

/// Decide which versions exceed retention
///
/// For each versioned definition the entries are ranked by descending
/// `table_version_id` and everything past `max_versions` is dropped.
/// Entries of non-versioned or unknown tables are always retained.
pub fn plan_prune(loaded: &[LoadedTableEntry], definitions: &[TableDefinition]) -> PrunePlan {
    let mut doomed: HashSet<(&str, u64)> = HashSet::new();
    for def in definitions.iter().filter(|d| d.is_versioned) {
        let mut versions: Vec<&LoadedTableEntry> = loaded
            .iter()
            .filter(|e| e.table_spec_name == def.name)
            .collect();
        versions.sort_by(|a, b| b.table_version_id.cmp(&a.table_version_id));
        for entry in versions.into_iter().skip(def.max_versions as usize) {
            doomed.insert((entry.table_spec_name.as_str(), entry.table_version_id));
        }
    }

    let (dropped, retained) = loaded.iter().cloned().partition(|e| {
        doomed.contains(&(e.table_spec_name.as_str(), e.table_version_id))
    });
    PrunePlan { retained, dropped }
}

async fn try_rollback(conn: &dyn EngineConnection) {
    if let Err(e) = conn.query("ROLLBACK").await {
        tracing::debug!(error = %e, "Rollback failed; transaction may not have started");
    }
}

/// Drop physical tables inside one transaction
///
/// Any failure rolls the whole transaction back.
///
/// # Errors
///
/// The first engine error raised by begin, a drop, or commit.
pub async fn drop_in_transaction(
    conn: &dyn EngineConnection,
    qualified_names: &[String],
) -> EngineResult<()> {
    conn.query("BEGIN TRANSACTION").await?;
    for name in qualified_names {
        if let Err(e) = conn.query(&format!("DROP TABLE IF EXISTS {}", name)).await {
            try_rollback(conn).await;
            return Err(e);
        }
    }
    if let Err(e) = conn.query("COMMIT").await {
        try_rollback(conn).await;
        return Err(e);
    }
    Ok(())
}

async fn drop_with_connection(
    engine: &dyn EngineInstance,
    qualified_names: &[String],
) -> EngineResult<()> {
    let conn = engine.connect().await?;
    let outcome = drop_in_transaction(conn.as_ref(), qualified_names).await;
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Closing drop connection failed");
    }
    outcome
}

fn qualified_names(entries: &[LoadedTableEntry], definitions: &[TableDefinition]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| {
            find_definition(definitions, &e.table_spec_name)
                .map(|def| def.qualified_name(&e.table_instance_name))
        })
        .collect()
}

/// Drop every version beyond retention and return the survivors
///
/// No transaction is opened when nothing exceeds retention.
///
/// # Errors
///
/// `Prune` when the engine fails; the transaction is rolled back and the
/// caller's version list should be left as it was.
pub async fn prune_versions(
    engine: &dyn EngineInstance,
    loaded: &[LoadedTableEntry],
    definitions: &[TableDefinition],
) -> Result<Vec<LoadedTableEntry>> {
    let plan = plan_prune(loaded, definitions);
    if plan.dropped.is_empty() {
        return Ok(plan.retained);
    }

    let targets = qualified_names(&plan.dropped, definitions);
    drop_with_connection(engine, &targets)
        .await
        .map_err(|e| DucklingError::Prune { message: e.message })?;

    tracing::info!(
        dropped_len = plan.dropped.len(),
        dropped = ?plan.dropped.iter().map(|e| e.table_instance_name.as_str()).collect::<Vec<_>>(),
        "Pruned table versions"
    );
    Ok(plan.retained)
}

/// Drop every loaded instance of one logical table and return the survivors
///
/// # Errors
///
/// `Drop` when the engine fails; the transaction is rolled back.
pub async fn drop_table(
    engine: &dyn EngineInstance,
    definition: &TableDefinition,
    loaded: &[LoadedTableEntry],
) -> Result<Vec<LoadedTableEntry>> {
    let (doomed, survivors): (Vec<LoadedTableEntry>, Vec<LoadedTableEntry>) = loaded
        .iter()
        .cloned()
        .partition(|e| e.table_spec_name == definition.name);
    if doomed.is_empty() {
        return Ok(survivors);
    }

    let targets: Vec<String> = doomed
        .iter()
        .map(|e| definition.qualified_name(&e.table_instance_name))
        .collect();
    drop_with_connection(engine, &targets)
        .await
        .map_err(|e| DucklingError::Drop {
            table_spec_name: definition.name.clone(),
            message: e.message,
        })?;

    tracing::info!(
        table_spec_name = %definition.name,
        dropped_len = doomed.len(),
        "Dropped table instances"
    );
    Ok(survivors)
}
