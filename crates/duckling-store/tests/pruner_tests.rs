mod common;

use chrono::Utc;
use common::{sqlite_engine, table_exists};
use duckling_core::engine::{EngineRef, InsertData, InsertOptions};
use duckling_core::errors::DucklingError;
use duckling_core::model::{LoadedTableEntry, TableDefinition};
use duckling_core::ops::{drop_table, prune_versions};
use serde_json::json;

async fn materialise(engine: &EngineRef, def: &TableDefinition, version: u64) -> LoadedTableEntry {
    let instance = def.instance_name(version);
    let conn = engine.connect().await.unwrap();
    conn.bulk_insert(
        &InsertData::Json(json!([{"v": version}])),
        &InsertOptions {
            name: instance.clone(),
            schema: def.schema.clone(),
            create: true,
        },
    )
    .await
    .unwrap();
    LoadedTableEntry {
        table_spec_name: def.name.clone(),
        table_instance_name: instance,
        table_version_id: version,
        table_is_versioned: def.is_versioned,
        loaded_epoch: Utc::now(),
    }
}

#[tokio::test]
async fn test_prune_drops_versions_beyond_retention() {
    let engine = sqlite_engine().await;
    let def = TableDefinition::versioned("main", "t", 2);
    let mut loaded = Vec::new();
    for version in 1..=3 {
        loaded.insert(0, materialise(&engine, &def, version).await);
    }

    let retained = prune_versions(engine.as_ref(), &loaded, &[def])
        .await
        .unwrap();

    let names: Vec<&str> = retained
        .iter()
        .map(|e| e.table_instance_name.as_str())
        .collect();
    assert_eq!(names, vec!["t_3", "t_2"]);
    assert!(!table_exists(&engine, "main", "t_1").await);
    assert!(table_exists(&engine, "main", "t_2").await);
}

#[tokio::test]
async fn test_prune_without_excess_opens_no_transaction() {
    let engine = sqlite_engine().await;
    let def = TableDefinition::versioned("main", "t", 3);
    let loaded = vec![materialise(&engine, &def, 1).await];
    engine.terminate().await.unwrap();

    // A terminated engine would fail any transaction
    let retained = prune_versions(engine.as_ref(), &loaded, &[def])
        .await
        .unwrap();
    assert_eq!(retained, loaded);
}

#[tokio::test]
async fn test_prune_failure_is_prune_error() {
    let engine = sqlite_engine().await;
    let def = TableDefinition::versioned("main", "t", 1);
    let loaded = vec![
        materialise(&engine, &def, 2).await,
        materialise(&engine, &def, 1).await,
    ];
    engine.terminate().await.unwrap();

    let err = prune_versions(engine.as_ref(), &loaded, &[def])
        .await
        .unwrap_err();
    assert!(matches!(err, DucklingError::Prune { .. }), "{err:?}");
}

#[tokio::test]
async fn test_drop_table_removes_every_instance_of_one_table() {
    let engine = sqlite_engine().await;
    let t = TableDefinition::versioned("main", "t", 3);
    let s = TableDefinition::new("main", "s");
    let loaded = vec![
        materialise(&engine, &t, 3).await,
        materialise(&engine, &s, 2).await,
        materialise(&engine, &t, 1).await,
    ];

    let survivors = drop_table(engine.as_ref(), &t, &loaded).await.unwrap();

    assert_eq!(survivors, vec![loaded[1].clone()]);
    assert!(!table_exists(&engine, "main", "t_3").await);
    assert!(!table_exists(&engine, "main", "t_1").await);
    assert!(table_exists(&engine, "main", "s").await);
}
