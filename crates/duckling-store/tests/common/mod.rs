use duckling_core::config::EngineInitParams;
use duckling_core::engine::{EngineFactory, EngineRef};
use duckling_store::SqliteEngineFactory;

/// Instantiate a fresh in-memory SQLite engine
#[allow(dead_code)]
pub async fn sqlite_engine() -> EngineRef {
    SqliteEngineFactory::new()
        .instantiate(&EngineInitParams::default(), None)
        .await
        .unwrap()
}

/// Whether a physical table exists, by `schema.name`
#[allow(dead_code)]
pub async fn table_exists(engine: &EngineRef, schema: &str, name: &str) -> bool {
    let conn = engine.connect().await.unwrap();
    let rs = conn
        .query(&format!(
            "SELECT count(*) FROM \"{}\".sqlite_master WHERE type = 'table' AND name = '{}'",
            schema, name
        ))
        .await
        .unwrap();
    rs.scalar().and_then(|v| v.as_i64()) == Some(1)
}

/// Number of rows in `schema.name`
#[allow(dead_code)]
pub async fn row_count(engine: &EngineRef, schema: &str, name: &str) -> i64 {
    let conn = engine.connect().await.unwrap();
    let rs = conn
        .query(&format!("SELECT count(*) FROM \"{}\".\"{}\"", schema, name))
        .await
        .unwrap();
    rs.scalar().and_then(|v| v.as_i64()).unwrap()
}
