//! The two pipeline entry points: raw ingestion and summary preprocessing.

use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{ConfigError, PipelineConfig};
use crate::data::{CleaningError, DataCleaner, DataLoader};
use crate::db::{Database, DatabaseError};
use crate::ingest::{ingest, ingest_directory, IngestReport, IngestionError, RunReport, WriteMode};
use crate::query::{compute_vendor_summary, QueryError, VENDOR_SUMMARY_TABLE};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Cleaning(#[from] CleaningError),
}

/// Load every CSV file of the configured data directory.
pub fn run_ingestion(config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    config.validate()?;
    let db = Database::open(&config.database)?;
    let loader = DataLoader::new(config.schema_registry());

    let result = ingest_directory(&db, &config.data_dir, &loader, config.ingest_options());
    match &result {
        Ok(report) if report.is_success() => info!("ingestion run succeeded"),
        Ok(report) => error!(
            failures = report.failures().count(),
            "ingestion run finished with failures"
        ),
        Err(e) => error!(error = %e, "ingestion run failed"),
    }

    let report = result?;
    db.close()?;
    Ok(report)
}

/// Summarize, clean and store the vendor summary table.
pub fn run_preprocessing(config: &PipelineConfig) -> Result<IngestReport, PipelineError> {
    config.validate()?;
    let db = Database::open(&config.database)?;

    let report = build_vendor_summary(&db, config.batch_size).inspect_err(|e| {
        error!(error = %e, "preprocessing run failed");
    })?;
    db.close()?;
    Ok(report)
}

/// Query, clean and replace `vendor_sales_summary` on an open database.
pub fn build_vendor_summary(db: &Database, batch_size: usize) -> Result<IngestReport, PipelineError> {
    let start = Instant::now();

    let summary = compute_vendor_summary(db)?;
    let cleaned = DataCleaner::clean(&summary).inspect_err(|e| {
        error!(error = %e, "cleaning vendor summary failed");
    })?;
    let report = ingest(db, &cleaned, VENDOR_SUMMARY_TABLE, batch_size, WriteMode::Replace)?;

    info!(
        table = VENDOR_SUMMARY_TABLE,
        rows = report.rows_written,
        seconds = start.elapsed().as_secs_f64(),
        "vendor summary table written"
    );
    Ok(report)
}
