#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{connected, rows};
use duckling_core::errors::DucklingError;
use duckling_core::model::{PendingTableLoad, TableDefinition};
use duckling_engine::{CatalogState, LifecycleState};

fn position(statements: &[String], needle: &str) -> usize {
    statements
        .iter()
        .position(|s| s == needle)
        .unwrap_or_else(|| panic!("statement {:?} not issued in {:?}", needle, statements))
}

#[tokio::test]
async fn test_version_ids_follow_issuance_order() {
    let (db, _engine) = connected(vec![TableDefinition::versioned("main", "t", 10)]).await;

    let mut ids = Vec::new();
    for n in 1..=5 {
        let entry = db.load_table(PendingTableLoad::json("t", rows(n))).await.unwrap();
        ids.push(entry.table_version_id);
    }

    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(db.snapshot().catalog.next_table_id, 6);
}

#[tokio::test]
async fn test_retention_drops_oldest_version() {
    let (db, engine) = connected(vec![TableDefinition::versioned("main", "t", 2)]).await;

    for payload in ["A", "B", "C"] {
        db.load_table(PendingTableLoad::json("t", serde_json::json!([{ "p": payload }])))
            .await
            .unwrap();
    }

    let loaded = db.list_tables().await.unwrap();
    let names: Vec<&str> = loaded.iter().map(|e| e.table_instance_name.as_str()).collect();
    assert_eq!(names, vec!["t_3", "t_2"]);
    assert!(loaded.iter().all(|e| e.table_is_versioned));

    assert!(!engine.has_table("main", "t_1"));
    assert!(engine.has_table("main", "t_2"));
    assert!(engine.has_table("main", "t_3"));

    let statements = engine.statements();
    let begin = position(&statements, "BEGIN TRANSACTION");
    let drop = position(&statements, "DROP TABLE IF EXISTS \"main\".\"t_1\"");
    let commit = position(&statements, "COMMIT");
    assert!(begin < drop && drop < commit);
}

#[tokio::test]
async fn test_retention_holds_for_many_loads() {
    let (db, engine) = connected(vec![TableDefinition::versioned("main", "t", 3)]).await;

    for _ in 0..8 {
        db.load_table(PendingTableLoad::json("t", rows(1))).await.unwrap();
    }

    let meta = db.table_metadata("t").await.unwrap();
    assert_eq!(meta.versions, vec![8, 7, 6]);
    assert_eq!(meta.latest_version, Some(8));
    assert_eq!(engine.table_names().len(), 3);
}

#[tokio::test]
async fn test_unversioned_table_keeps_single_entry() {
    let (db, engine) = connected(vec![TableDefinition::new("main", "s")]).await;

    db.load_table(PendingTableLoad::json("s", rows(3))).await.unwrap();
    let second = db.load_table(PendingTableLoad::json("s", rows(1))).await.unwrap();

    let loaded = db.list_tables().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].table_instance_name, "s");
    assert_eq!(loaded[0].table_version_id, 2);
    assert_eq!(loaded[0], second);
    assert_eq!(engine.rows_in("main", "s"), Some(1));

    // The second load dropped the first table before creating its own
    let statements = engine.statements();
    let inserts: Vec<usize> = statements
        .iter()
        .enumerate()
        .filter(|(_, s)| s.as_str() == "INSERT \"main\".\"s\" create=true")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(inserts.len(), 2);
    let drop_before_second = statements[inserts[0]..inserts[1]]
        .iter()
        .any(|s| s == "DROP TABLE IF EXISTS \"main\".\"s\"");
    assert!(drop_before_second);
}

#[tokio::test]
async fn test_pruning_ignores_unversioned_tables() {
    let (db, _engine) = connected(vec![
        TableDefinition::versioned("main", "t", 1),
        TableDefinition::new("main", "s"),
    ])
    .await;

    db.load_table(PendingTableLoad::json("s", rows(1))).await.unwrap();
    db.load_table(PendingTableLoad::json("t", rows(1))).await.unwrap();
    db.load_table(PendingTableLoad::json("t", rows(1))).await.unwrap();

    let loaded = db.list_tables().await.unwrap();
    let names: Vec<&str> = loaded.iter().map(|e| e.table_instance_name.as_str()).collect();
    assert_eq!(names, vec!["t_3", "s"]);
}

#[tokio::test]
async fn test_unknown_table_fails_without_touching_versions() {
    let (db, engine) = connected(vec![TableDefinition::versioned("main", "t", 2)]).await;
    db.load_table(PendingTableLoad::json("t", rows(1))).await.unwrap();
    let before = db.list_tables().await.unwrap();

    let err = db
        .load_table(PendingTableLoad::json("nope", rows(1)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        DucklingError::TableDefinitionNotFound {
            table_spec_name: "nope".to_string()
        }
    );

    let snapshot = db.snapshot();
    assert_eq!(snapshot.catalog.state, CatalogState::Error);
    assert_eq!(snapshot.catalog.loaded_versions, before);
    assert_eq!(snapshot.catalog.last_error, Some(err));
    // The failed load still consumed an id
    assert_eq!(snapshot.catalog.next_table_id, 3);
    assert_eq!(snapshot.state, LifecycleState::Connected);
    assert_eq!(engine.table_names().len(), 1);
}

#[tokio::test]
async fn test_definitions_and_metadata_reads() {
    let defs = vec![
        TableDefinition::versioned("main", "t", 2),
        TableDefinition::new("staging", "s"),
    ];
    let (db, _engine) = connected(defs.clone()).await;

    assert_eq!(db.list_definitions().await.unwrap(), defs);

    let empty = db.table_metadata("t").await.unwrap();
    assert!(empty.versions.is_empty());
    assert_eq!(empty.latest_version, None);

    db.load_table(PendingTableLoad::json("s", rows(2))).await.unwrap();
    db.load_table(PendingTableLoad::json("t", rows(2))).await.unwrap();
    let meta = db.table_metadata("t").await.unwrap();
    assert_eq!(meta.versions, vec![2]);
    assert_eq!(meta.latest_version, Some(2));
}

#[tokio::test]
async fn test_staging_schema_is_used_for_instances() {
    let (db, engine) = connected(vec![TableDefinition::versioned("staging", "dim", 2)]).await;

    let entry = db.load_table(PendingTableLoad::json("dim", rows(4))).await.unwrap();

    assert_eq!(entry.table_instance_name, "dim_1");
    assert_eq!(engine.rows_in("staging", "dim_1"), Some(4));
    assert!(!engine.has_table("main", "dim_1"));
}
