use rusqlite::Connection;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{Error, Result};

const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed folder registry and inventory store.
///
/// The connection sits behind a mutex so one `Database` can be shared across
/// threads through an `Arc`.
pub struct Database {
    conn: Mutex<Connection>,
    location: PathBuf,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, PathBuf::from(path))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, location: PathBuf) -> Result<Self> {
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Database {
            conn: Mutex::new(conn),
            location,
        })
    }

    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| Error::Io {
            path: self.location.clone(),
            source: io::Error::new(
                io::ErrorKind::Other,
                format!("Failed to lock database: {}", e),
            ),
        })
    }
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA cache_size = -64000;
         PRAGMA busy_timeout = 5000;",
    )?;
    debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
    Ok(())
}

/// Create missing tables. Databases written by a newer schema are refused.
fn migrate_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(Error::Validation(format!(
            "database schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    conn.execute_batch(include_str!("schema.sql"))?;
    debug!("SQLite schema initialized (version {})", SCHEMA_VERSION);
    Ok(())
}
