use crate::core::error::{self, RatingError};
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub fn db_connect(db_path: &str, busy_timeout_secs: u32) -> Result<Connection, error::RatingError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(u64::from(busy_timeout_secs)))
        .map_err(RatingError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(RatingError::RusqliteError)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(RatingError::RusqliteError)?;
    Ok(conn)
}

/// Make sure the data directory exists and is writable before the first connection.
pub fn storage_preflight(data_dir: &Path) -> Result<(), error::RatingError> {
    fs::create_dir_all(data_dir)?;
    let probe = data_dir.join(".storerate_probe");
    fs::write(&probe, b"ok").map_err(|e| {
        RatingError::IoError(std::io::Error::new(
            e.kind(),
            format!("STORAGE_PREFLIGHT_FAILED: {}: {}", data_dir.display(), e),
        ))
    })?;
    fs::remove_file(&probe)?;
    Ok(())
}

/// Create tables and indexes, then stamp the schema version. Idempotent.
pub fn ensure_schema(conn: &Connection) -> Result<(), error::RatingError> {
    conn.execute(schemas::DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let expected = schemas::SCHEMA_VERSION.to_string();
    if current.as_deref() == Some(expected.as_str()) {
        return Ok(());
    }
    if let Some(found) = current.as_deref() {
        let found_num: u32 = found.parse().map_err(|_| {
            RatingError::ValidationError(format!("corrupt schema_version in meta: {found}"))
        })?;
        if found_num > schemas::SCHEMA_VERSION {
            return Err(RatingError::ValidationError(format!(
                "database schema v{found_num} is newer than supported v{}",
                schemas::SCHEMA_VERSION
            )));
        }
    }

    debug!(from = ?current, to = schemas::SCHEMA_VERSION, "applying schema");
    conn.execute(schemas::DB_SCHEMA_USERS, [])?;
    conn.execute(schemas::DB_SCHEMA_STORES, [])?;
    conn.execute(schemas::DB_SCHEMA_RATINGS, [])?;
    for stmt in schemas::DB_SCHEMA_INDEXES {
        conn.execute(stmt, [])?;
    }
    conn.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![expected],
    )?;
    info!(version = schemas::SCHEMA_VERSION, "database schema ready");
    Ok(())
}
