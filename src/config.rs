//! Pipeline configuration loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::data::{SchemaRegistry, TableSchema};
use crate::ingest::{ErrorPolicy, IngestOptions, WriteMode, DEFAULT_BATCH_SIZE};

/// Only embedded DuckDB is wired up.
pub const SUPPORTED_DRIVER: &str = "duckdb";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Batch size must be positive")]
    InvalidBatchSize,
    #[error("Unsupported database driver '{0}' (expected 'duckdb')")]
    UnsupportedDriver(String),
}

/// Connection components of the target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Database name; for DuckDB this is the database file or `:memory:`.
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: SUPPORTED_DRIVER.to_string(),
            user: "root".to_string(),
            password: "root".to_string(),
            host: "localhost".to_string(),
            port: 3306,
            database: "inventory.duckdb".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Full connection string, password included.
    pub fn connection_string(&self) -> String {
        format!(
            "{}://{}:{}@{}:{}/{}",
            self.driver, self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// Connection string with the password masked, safe for logs.
impl fmt::Display for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:***@{}:{}/{}",
            self.driver, self.user, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
    pub log_level: String,
    pub batch_size: usize,
    pub write_mode: WriteMode,
    pub error_policy: ErrorPolicy,
    pub database: DatabaseConfig,
    /// Extra or overriding table descriptors, keyed by table name.
    pub schemas: BTreeMap<String, TableSchema>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_file: PathBuf::from("logs/pipeline.log"),
            log_level: "info".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            write_mode: WriteMode::default(),
            error_policy: ErrorPolicy::default(),
            database: DatabaseConfig::default(),
            schemas: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Read `path` without validating it; a missing file gives defaults.
    ///
    /// An unreadable or malformed file also yields defaults, alongside the
    /// error, so the caller can set up logging before reporting it.
    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|text| Ok(toml::from_str::<Self>(&text)?));
        match parsed {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if !self.database.driver.eq_ignore_ascii_case(SUPPORTED_DRIVER) {
            return Err(ConfigError::UnsupportedDriver(self.database.driver.clone()));
        }
        Ok(())
    }

    /// Built-in inventory descriptors with configured ones layered on top.
    pub fn schema_registry(&self) -> SchemaRegistry {
        let mut registry = SchemaRegistry::inventory();
        for (table, schema) in &self.schemas {
            registry.register(table, schema.clone());
        }
        registry
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            batch_size: self.batch_size,
            write_mode: self.write_mode,
            error_policy: self.error_policy,
        }
    }
}
