//! Loader: materialise one version of a logical table

use crate::engine::{EngineConnection, EngineError, EngineInstance, InsertData, InsertOptions};
use crate::errors::{DucklingError, Result};
use crate::model::{find_definition, LoadedTableEntry, PendingTableLoad, TableDefinition};
use crate::ops::payload::decode_payload;
use chrono::Utc;

/// Everything the loader needs besides the engine
#[derive(Debug, Clone, Copy)]
pub struct LoadInput<'a> {
    /// Version id assigned to this attempt
    pub next_table_id: u64,
    pub table_definitions: &'a [TableDefinition],
    pub request: &'a PendingTableLoad,
}

fn load_error(def: &TableDefinition, instance_name: &str, err: EngineError) -> DucklingError {
    DucklingError::Load {
        table_spec_name: def.name.clone(),
        table_instance_name: instance_name.to_string(),
        message: err.message,
        subtype: err.subtype,
    }
}

/// Load a payload as a new physical instance of its logical table
///
/// Non-versioned tables have their single instance dropped and recreated.
/// Versioned tables always get a fresh `name_<id>` instance and nothing is
/// dropped here; retention is the pruner's job. An insert rejected with
/// `ENTRY_ALREADY_EXISTS` is retried once in append mode.
///
/// # Errors
///
/// `TableDefinitionNotFound`, `PayloadDecode`, or `Load` for any engine
/// failure while connecting, dropping or inserting.
pub async fn load_table(engine: &dyn EngineInstance, input: LoadInput<'_>) -> Result<LoadedTableEntry> {
    let request = input.request;
    let def = find_definition(input.table_definitions, &request.table_spec_name).ok_or_else(|| {
        DucklingError::TableDefinitionNotFound {
            table_spec_name: request.table_spec_name.clone(),
        }
    })?;
    let instance_name = def.instance_name(input.next_table_id);

    let data = decode_payload(
        &def.name,
        &request.payload,
        request.payload_type,
        request.payload_compression,
    )?;

    let conn = engine
        .connect()
        .await
        .map_err(|e| load_error(def, &instance_name, e))?;
    let outcome = insert_instance(conn.as_ref(), def, &instance_name, data.as_ref()).await;
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "Closing load connection failed");
    }
    outcome?;

    Ok(LoadedTableEntry {
        table_spec_name: def.name.clone(),
        table_instance_name: instance_name,
        table_version_id: input.next_table_id,
        table_is_versioned: def.is_versioned,
        loaded_epoch: Utc::now(),
    })
}

async fn insert_instance(
    conn: &dyn EngineConnection,
    def: &TableDefinition,
    instance_name: &str,
    data: Option<&InsertData>,
) -> Result<()> {
    let qualified = def.qualified_name(instance_name);

    if !def.is_versioned {
        conn.query(&format!("DROP TABLE IF EXISTS {}", qualified))
            .await
            .map_err(|e| load_error(def, instance_name, e))?;
    }

    let Some(data) = data else {
        tracing::debug!(table_instance_name = instance_name, "Empty payload, nothing inserted");
        return Ok(());
    };

    let mut options = InsertOptions {
        name: instance_name.to_string(),
        schema: def.schema.clone(),
        create: true,
    };
    match conn.bulk_insert(data, &options).await {
        Ok(()) => {}
        Err(e) if e.is_entry_already_exists() => {
            tracing::debug!(
                table_instance_name = instance_name,
                "Table already exists, inserting into existing table"
            );
            options.create = false;
            conn.bulk_insert(data, &options)
                .await
                .map_err(|e| load_error(def, instance_name, e))?;
        }
        Err(e) => return Err(load_error(def, instance_name, e)),
    }

    match conn
        .query(&format!("SELECT count(*) AS rowcount FROM {}", qualified))
        .await
    {
        Ok(counted) => tracing::info!(
            table_instance_name = instance_name,
            schema = %def.schema,
            row_count = counted.scalar().and_then(|v| v.as_u64()).unwrap_or(0),
            size_bytes = data.size_bytes(),
            "Loaded table instance"
        ),
        Err(e) => tracing::warn!(
            table_instance_name = instance_name,
            error = %e,
            "Row count after load failed"
        ),
    }

    Ok(())
}
