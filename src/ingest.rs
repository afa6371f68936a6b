//! Batch Loader Module
//! Writes DataFrames into database tables in bounded multi-row INSERT batches.

use duckdb::types::Value;
use duckdb::{params_from_iter, Connection};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::data::{list_csv_files, table_name_for, DataLoader, SchemaError};
use crate::db::{any_to_sql, quote_ident, sql_type_for, table_exists, Database};

/// Rows per INSERT statement unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Batch size must be positive")]
    InvalidBatchSize,
    #[error("Dataset for table '{table}' has no columns")]
    EmptySchema { table: String },
    #[error("Table '{table}' already exists")]
    TableExists { table: String },
    #[error("Failed writing table '{table}': {source}")]
    Database {
        table: String,
        #[source]
        source: duckdb::Error,
    },
    #[error("Failed reading rows for table '{table}': {source}")]
    Dataset {
        table: String,
        #[source]
        source: PolarsError,
    },
    #[error("Failed to parse '{}' for table '{table}': {source}", file.display())]
    Schema {
        file: PathBuf,
        table: String,
        #[source]
        source: SchemaError,
    },
    #[error("Failed to list directory '{}': {source}", dir.display())]
    Directory {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestionError {
    /// Destination table the failure belongs to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            IngestionError::EmptySchema { table }
            | IngestionError::TableExists { table }
            | IngestionError::Database { table, .. }
            | IngestionError::Dataset { table, .. }
            | IngestionError::Schema { table, .. } => Some(table),
            IngestionError::InvalidBatchSize | IngestionError::Directory { .. } => None,
        }
    }
}

/// How a write treats an existing destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Drop the table if present, then create it fresh
    #[default]
    Replace,
    /// Insert into the table, creating it when absent
    Append,
    /// Refuse to write when the table already exists
    FailIfExists,
}

/// What to do when one file of a directory run fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Abort the run at the first failure
    #[default]
    FailFast,
    /// Record the failure and continue with the next file
    Continue,
}

/// Outcome of writing one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub table: String,
    pub rows_written: usize,
    pub batches: usize,
}

/// Per-file result of a directory run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Loaded { file: PathBuf, report: IngestReport },
    Failed { file: PathBuf, table: String, error: String },
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Loaded { .. })
    }
}

/// Everything a directory run attempted, in file order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<FileOutcome>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn rows_written(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                FileOutcome::Loaded { report, .. } => report.rows_written,
                FileOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(FileOutcome::is_success)
    }
}

/// Settings for a directory run.
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub write_mode: WriteMode,
    pub error_policy: ErrorPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            write_mode: WriteMode::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

/// Write `df` into `table`, one multi-row INSERT per `batch_size` rows.
///
/// Each batch commits on its own: when a later batch fails, earlier ones stay
/// in the table.
pub fn ingest(
    db: &Database,
    df: &DataFrame,
    table: &str,
    batch_size: usize,
    mode: WriteMode,
) -> Result<IngestReport, IngestionError> {
    let result = write_batches(db.connection(), df, table, batch_size, mode);
    match &result {
        Ok(report) => info!(
            table,
            rows = report.rows_written,
            batches = report.batches,
            "inserted rows"
        ),
        Err(e) => error!(table, error = %e, "error inserting rows"),
    }
    result
}

fn write_batches(
    conn: &Connection,
    df: &DataFrame,
    table: &str,
    batch_size: usize,
    mode: WriteMode,
) -> Result<IngestReport, IngestionError> {
    if batch_size == 0 {
        return Err(IngestionError::InvalidBatchSize);
    }
    if df.width() == 0 {
        return Err(IngestionError::EmptySchema {
            table: table.to_string(),
        });
    }

    let db_err = |source| IngestionError::Database {
        table: table.to_string(),
        source,
    };
    let dataset_err = |source| IngestionError::Dataset {
        table: table.to_string(),
        source,
    };

    prepare_table(conn, df, table, mode).map_err(|e| match e {
        PrepareError::Exists => IngestionError::TableExists {
            table: table.to_string(),
        },
        PrepareError::Db(source) => db_err(source),
    })?;

    let columns = df.get_columns();
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c.name()))
        .collect::<Vec<_>>()
        .join(", ");
    let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));

    let mut rows_written = 0;
    let mut batches = 0;
    let mut offset = 0;
    while offset < df.height() {
        let len = batch_size.min(df.height() - offset);
        let mut params: Vec<Value> = Vec::with_capacity(len * columns.len());
        for row in offset..offset + len {
            for column in columns {
                params.push(any_to_sql(column.get(row).map_err(dataset_err)?));
            }
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            column_list,
            vec![row_placeholder.as_str(); len].join(", ")
        );
        conn.execute(&sql, params_from_iter(params)).map_err(db_err)?;

        rows_written += len;
        batches += 1;
        offset += len;
    }

    Ok(IngestReport {
        table: table.to_string(),
        rows_written,
        batches,
    })
}

enum PrepareError {
    Exists,
    Db(duckdb::Error),
}

impl From<duckdb::Error> for PrepareError {
    fn from(e: duckdb::Error) -> Self {
        PrepareError::Db(e)
    }
}

fn prepare_table(
    conn: &Connection,
    df: &DataFrame,
    table: &str,
    mode: WriteMode,
) -> Result<(), PrepareError> {
    let definition = df
        .get_columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(c.name()), sql_type_for(c.dtype())))
        .collect::<Vec<_>>()
        .join(", ");
    let name = quote_ident(table);

    match mode {
        WriteMode::Replace => {
            conn.execute_batch(&format!(
                "DROP TABLE IF EXISTS {name}; CREATE TABLE {name} ({definition});"
            ))?;
        }
        WriteMode::Append => {
            conn.execute_batch(&format!("CREATE TABLE IF NOT EXISTS {name} ({definition});"))?;
        }
        WriteMode::FailIfExists => {
            if table_exists(conn, table)? {
                return Err(PrepareError::Exists);
            }
            conn.execute_batch(&format!("CREATE TABLE {name} ({definition});"))?;
        }
    }
    Ok(())
}

/// Load every CSV file in `dir` into a table named after the file.
///
/// Files are processed in name order. Under `ErrorPolicy::FailFast` the first
/// failure is returned as the error; under `Continue` it is recorded in the
/// report and the run moves on.
pub fn ingest_directory(
    db: &Database,
    dir: &Path,
    loader: &DataLoader,
    options: IngestOptions,
) -> Result<RunReport, IngestionError> {
    let start = Instant::now();
    let files = list_csv_files(dir).map_err(|source| {
        let e = IngestionError::Directory {
            dir: dir.to_path_buf(),
            source,
        };
        error!(error = %e, "cannot list source directory");
        e
    })?;
    info!(dir = %dir.display(), files = files.len(), "starting ingestion");

    let mut report = RunReport::default();
    for file in files {
        let Some(table) = table_name_for(&file) else {
            continue;
        };
        info!(file = %file.display(), table = %table, "ingesting file");

        let result = loader
            .load_csv(&file, &table)
            .map_err(|source| {
                let e = IngestionError::Schema {
                    file: file.clone(),
                    table: table.clone(),
                    source,
                };
                error!(error = %e, "error parsing file");
                e
            })
            .and_then(|df| {
                ingest(
                    db,
                    &df,
                    &table,
                    options.batch_size,
                    options.write_mode,
                )
            });

        match result {
            Ok(ingested) => report.outcomes.push(FileOutcome::Loaded {
                file,
                report: ingested,
            }),
            Err(e) if options.error_policy == ErrorPolicy::Continue => {
                report.outcomes.push(FileOutcome::Failed {
                    file,
                    table,
                    error: e.to_string(),
                })
            }
            Err(e) => return Err(e),
        }
    }

    report.elapsed_secs = start.elapsed().as_secs_f64();
    info!(
        files = report.outcomes.len(),
        failures = report.failures().count(),
        rows = report.rows_written(),
        "ingestion complete"
    );
    info!(
        minutes = report.elapsed_secs / 60.0,
        "total time taken for ingestion"
    );
    Ok(report)
}
