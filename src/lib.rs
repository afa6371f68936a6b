//! Vendor Summary ETL - CSV ingestion and vendor performance summary
//!
//! Loads raw inventory CSV files into DuckDB, aggregates purchases, sales and
//! freight per vendor and brand, cleans the result and stores it as
//! `vendor_sales_summary`.

pub mod config;
pub mod data;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod query;

pub use config::{DatabaseConfig, PipelineConfig};
pub use data::{DataCleaner, DataLoader};
pub use db::Database;
pub use ingest::{ingest, ingest_directory, ErrorPolicy, IngestOptions, IngestReport, RunReport, WriteMode};
pub use query::{compute_vendor_summary, read_table, VENDOR_SUMMARY_TABLE};
