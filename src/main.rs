//! vendor-etl - inventory CSV ingestion and vendor summary preprocessing
//!
//! Two entry points:
//! - `vendor-etl ingest`      load every CSV in the data directory
//! - `vendor-etl preprocess`  build and store `vendor_sales_summary`

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use vendor_summary_etl::ingest::{ErrorPolicy, FileOutcome, WriteMode};
use vendor_summary_etl::logging::init_file_logging;
use vendor_summary_etl::pipeline::{run_ingestion, run_preprocessing};
use vendor_summary_etl::PipelineConfig;

/// Default configuration file name.
const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

#[derive(Parser)]
#[command(name = "vendor-etl")]
#[command(about = "Load inventory CSV files and build the vendor sales summary")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults apply when it does not exist)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every CSV file of the data directory into its own table
    Ingest {
        /// Directory holding the source CSV files
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Rows per INSERT statement
        #[arg(long)]
        batch_size: Option<usize>,

        /// How to treat tables that already exist
        #[arg(long, value_enum)]
        mode: Option<WriteMode>,

        /// Continue with the next file when one fails
        #[arg(long)]
        keep_going: bool,
    },
    /// Build, clean and store the vendor sales summary
    Preprocess {
        /// Rows per INSERT statement
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, load_error) = PipelineConfig::load_or_default(&cli.config);

    match &cli.command {
        Commands::Ingest {
            data_dir,
            batch_size,
            mode,
            keep_going,
        } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir.clone();
            }
            if let Some(size) = batch_size {
                config.batch_size = *size;
            }
            if let Some(mode) = mode {
                config.write_mode = *mode;
            }
            if *keep_going {
                config.error_policy = ErrorPolicy::Continue;
            }
        }
        Commands::Preprocess { batch_size } => {
            if let Some(size) = batch_size {
                config.batch_size = *size;
            }
        }
    }
    let invalid = config.validate().err();

    // Logging comes up first, on defaults if need be, so that a bad
    // configuration is recorded in the log file too.
    init_file_logging(&config.log_file, &config.log_level)?;
    if let Some(e) = load_error {
        error!(config = %cli.config.display(), error = %e, "failed to load configuration");
        return Err(e).with_context(|| format!("loading {}", cli.config.display()));
    }
    if let Some(e) = invalid {
        error!(config = %cli.config.display(), error = %e, "invalid configuration");
        return Err(e.into());
    }

    match cli.command {
        Commands::Ingest { .. } => {
            let report = run_ingestion(&config).context("ingestion failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for outcome in &report.outcomes {
                    match outcome {
                        FileOutcome::Loaded { file, report } => println!(
                            "loaded {} -> {} ({} rows)",
                            file.display(),
                            report.table,
                            report.rows_written
                        ),
                        FileOutcome::Failed { file, error, .. } => {
                            println!("failed {}: {}", file.display(), error)
                        }
                    }
                }
                println!(
                    "{} rows in {:.2} minutes",
                    report.rows_written(),
                    report.elapsed_secs / 60.0
                );
            }
            if !report.is_success() {
                bail!("{} file(s) failed to load", report.failures().count());
            }
        }
        Commands::Preprocess { .. } => {
            let report = run_preprocessing(&config).context("preprocessing failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("wrote {} rows to {}", report.rows_written, report.table);
            }
        }
    }

    Ok(())
}
