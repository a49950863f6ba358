mod common;

use common::{row_count, sqlite_engine, table_exists};
use duckling_core::config::{EngineInitParams, EngineOpenConfig};
use duckling_core::engine::{EngineFactory, InsertData, InsertOptions, InstantiationProgress};
use duckling_store::SqliteEngineFactory;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn options(name: &str, create: bool) -> InsertOptions {
    InsertOptions {
        name: name.to_string(),
        schema: "main".to_string(),
        create,
    }
}

#[tokio::test]
async fn test_instantiate_reports_progress_and_version() {
    let seen: Arc<Mutex<Vec<InstantiationProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let engine = SqliteEngineFactory::new()
        .instantiate(
            &EngineInitParams::default(),
            Some(Arc::new(move |p| sink.lock().unwrap().push(p))),
        )
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 1);
    assert!(engine.version().await.unwrap().starts_with("SQLite "));
}

#[tokio::test]
async fn test_bulk_insert_creates_and_queries() {
    let engine = sqlite_engine().await;
    let conn = engine.connect().await.unwrap();

    conn.bulk_insert(
        &InsertData::Json(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}])),
        &options("people", true),
    )
    .await
    .unwrap();

    let rs = conn
        .query("SELECT id, name FROM people ORDER BY id")
        .await
        .unwrap();
    assert_eq!(rs.columns, vec!["id", "name"]);
    assert_eq!(rs.rows, vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]);
    assert_eq!(rs.to_json_rows()[1]["name"], json!("b"));
}

#[tokio::test]
async fn test_create_on_existing_table_reports_entry_already_exists() {
    let engine = sqlite_engine().await;
    let conn = engine.connect().await.unwrap();
    let rows = InsertData::Json(json!([{"v": 1}]));

    conn.bulk_insert(&rows, &options("t", true)).await.unwrap();
    let err = conn.bulk_insert(&rows, &options("t", true)).await.unwrap_err();
    assert!(err.is_entry_already_exists());

    conn.bulk_insert(&rows, &options("t", false)).await.unwrap();
    assert_eq!(row_count(&engine, "main", "t").await, 2);
}

#[tokio::test]
async fn test_append_into_missing_table_fails() {
    let engine = sqlite_engine().await;
    let conn = engine.connect().await.unwrap();

    let err = conn
        .bulk_insert(&InsertData::Json(json!([{"v": 1}])), &options("absent", false))
        .await
        .unwrap_err();

    assert_eq!(err.subtype.as_deref(), Some("ENTRY_NOT_FOUND"));
}

#[tokio::test]
async fn test_bytes_payload_holds_json_rows() {
    let engine = sqlite_engine().await;
    let conn = engine.connect().await.unwrap();

    conn.bulk_insert(
        &InsertData::Bytes(br#"[{"x": 1.5}, {"x": 2.5}]"#.to_vec()),
        &options("b", true),
    )
    .await
    .unwrap();

    let rs = conn.query("SELECT sum(x) FROM b").await.unwrap();
    assert_eq!(rs.scalar(), Some(&json!(4.0)));
}

#[tokio::test]
async fn test_non_main_schema_is_attached_on_demand() {
    let engine = sqlite_engine().await;
    let conn = engine.connect().await.unwrap();

    conn.query("DROP TABLE IF EXISTS \"staging\".\"s\"")
        .await
        .unwrap();
    conn.bulk_insert(
        &InsertData::Json(json!([{"v": 1}])),
        &InsertOptions {
            name: "s".to_string(),
            schema: "staging".to_string(),
            create: true,
        },
    )
    .await
    .unwrap();

    assert!(table_exists(&engine, "staging", "s").await);
    assert!(!table_exists(&engine, "main", "s").await);
}

#[tokio::test]
async fn test_query_error_is_structured() {
    let engine = sqlite_engine().await;
    let conn = engine.connect().await.unwrap();

    let err = conn.query("SELEC 1").await.unwrap_err();

    assert!(err.message.contains("syntax error"));
    assert!(err.subtype.is_some());
}

#[tokio::test]
async fn test_closed_connection_and_terminated_engine_refuse_work() {
    let engine = sqlite_engine().await;
    let conn = engine.connect().await.unwrap();
    conn.close().await.unwrap();
    assert_eq!(
        conn.query("SELECT 1").await.unwrap_err().subtype.as_deref(),
        Some("CONNECTION_CLOSED")
    );

    engine.terminate().await.unwrap();
    assert!(engine.connect().await.is_err());
    assert!(engine.version().await.is_err());
    engine.terminate().await.unwrap();
}

#[tokio::test]
async fn test_open_file_backed_database_with_pragmas() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("duckling.db");
    let mut pragmas = BTreeMap::new();
    pragmas.insert("journal_mode".to_string(), "WAL".to_string());

    let engine = sqlite_engine().await;
    engine
        .open(&EngineOpenConfig {
            path: Some(path.to_string_lossy().into_owned()),
            pragmas,
        })
        .await
        .unwrap();

    let conn = engine.connect().await.unwrap();
    conn.bulk_insert(&InsertData::Json(json!([{"v": 1}])), &options("f", true))
        .await
        .unwrap();
    let mode = conn.query("PRAGMA journal_mode").await.unwrap();
    assert_eq!(mode.scalar(), Some(&json!("wal")));

    engine.terminate().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_sessions_share_transaction_state() {
    let engine = sqlite_engine().await;
    let first = engine.connect().await.unwrap();
    let second = engine.connect().await.unwrap();

    first.query("BEGIN TRANSACTION").await.unwrap();
    first.query("CREATE TABLE tx (v INTEGER)").await.unwrap();
    second.query("ROLLBACK").await.unwrap();

    assert!(!table_exists(&engine, "main", "tx").await);
}
