//! Database connection management
//!
//! Opens the SQLite database backing an engine instance and applies the
//! configured pragmas.

use crate::errors::{from_rusqlite, invalid_input};
use duckling_core::config::EngineOpenConfig;
use duckling_core::engine::EngineResult;
use duckling_core::model::quote_ident;
use rusqlite::Connection;
use std::path::Path;

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Connection> {
    Connection::open(path).map_err(from_rusqlite)
}

/// Open an in-memory SQLite database
pub fn open_in_memory() -> EngineResult<Connection> {
    Connection::open_in_memory().map_err(from_rusqlite)
}

/// Open the database described by `config`
///
/// No path means an in-memory database.
pub fn open_with(config: &EngineOpenConfig) -> EngineResult<Connection> {
    let conn = match config.path.as_deref() {
        Some(path) => open(path)?,
        None => open_in_memory()?,
    };
    for (name, value) in &config.pragmas {
        apply_pragma(&conn, name, value)?;
    }
    Ok(conn)
}

fn is_plain(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Apply one `PRAGMA name = value`
///
/// Pragma names must be plain identifiers; values that are not plain words
/// or numbers are passed as string literals.
pub fn apply_pragma(conn: &Connection, name: &str, value: &str) -> EngineResult<()> {
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || name.is_empty() {
        return Err(invalid_input(format!("Invalid pragma name '{}'", name)));
    }
    let value = if is_plain(value) {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    };
    // Some pragmas answer with a row; drain it
    let mut stmt = conn
        .prepare(&format!("PRAGMA {} = {}", name, value))
        .map_err(from_rusqlite)?;
    let mut rows = stmt.query([]).map_err(from_rusqlite)?;
    while rows.next().map_err(from_rusqlite)?.is_some() {}
    tracing::debug!(pragma = name, value = %value, "Applied pragma");
    Ok(())
}

/// Attach an in-memory database under `schema` unless it already exists
pub fn ensure_schema(conn: &Connection, schema: &str) -> EngineResult<()> {
    if schema == "main" || schema == "temp" {
        return Ok(());
    }
    let mut stmt = conn
        .prepare("SELECT count(*) FROM pragma_database_list WHERE name = ?1")
        .map_err(from_rusqlite)?;
    let attached: i64 = stmt
        .query_row([schema], |row| row.get(0))
        .map_err(from_rusqlite)?;
    if attached == 0 {
        conn.execute_batch(&format!("ATTACH DATABASE ':memory:' AS {};", quote_ident(schema)))
            .map_err(from_rusqlite)?;
        tracing::debug!(schema, "Attached schema");
    }
    Ok(())
}

/// Check whether a table exists in `schema`
pub fn table_exists(conn: &Connection, schema: &str, name: &str) -> EngineResult<bool> {
    let sql = format!(
        "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
        quote_ident(schema)
    );
    let count: i64 = conn
        .query_row(&sql, [name], |row| row.get(0))
        .map_err(from_rusqlite)?;
    Ok(count > 0)
}
