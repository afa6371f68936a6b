//! Database module - connection handle and value conversion

mod values;

pub use values::{any_to_sql, sql_type_for};

use duckdb::{params, Connection};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;

/// Database component meaning "no file, keep everything in memory".
pub const IN_MEMORY: &str = ":memory:";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to open database '{database}': {source}")]
    Open {
        database: String,
        #[source]
        source: duckdb::Error,
    },
    #[error("Failed to create database directory '{}': {source}", dir.display())]
    Directory {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to close database: {0}")]
    Close(#[source] duckdb::Error),
}

/// A single database connection held for the duration of one pipeline run.
///
/// Dropping the handle closes the connection; `close` does the same but
/// reports a failure instead of discarding it.
pub struct Database {
    conn: Connection,
    descriptor: String,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let descriptor = config.to_string();
        let conn = if config.database == IN_MEMORY {
            Connection::open_in_memory()
        } else {
            let path = PathBuf::from(&config.database);
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Directory {
                    dir: dir.to_path_buf(),
                    source,
                })?;
            }
            Connection::open(&path)
        }
        .map_err(|source| DatabaseError::Open {
            database: config.database.clone(),
            source,
        })?;

        info!(database = %descriptor, "opened database");
        Ok(Self { conn, descriptor })
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::open(&DatabaseConfig {
            database: IN_MEMORY.to_string(),
            ..DatabaseConfig::default()
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn close(self) -> Result<(), DatabaseError> {
        let descriptor = self.descriptor;
        match self.conn.close() {
            Ok(()) => {
                debug!(database = %descriptor, "closed database");
                Ok(())
            }
            Err((_conn, source)) => {
                warn!(database = %descriptor, error = %source, "failed to close database");
                Err(DatabaseError::Close(source))
            }
        }
    }
}

/// Double-quote an identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Whether a table with this name exists in the main schema.
pub fn table_exists(conn: &Connection, table: &str) -> duckdb::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE lower(table_name) = lower(?)",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
