//! Read-only SQLite helpers shared by the extractors.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::ExtractError;

/// Open a database without ever writing to the backup.
pub(crate) fn open_readonly(path: &Path) -> Result<Connection, ExtractError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| ExtractError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Names of all tables in the database.
pub(crate) fn table_names(conn: &Connection, path: &Path) -> Result<Vec<String>, ExtractError> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table'")
        .map_err(ExtractError::query(path))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(ExtractError::query(path))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
