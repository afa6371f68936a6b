//! CSV Data Loader Module
//! Handles raw CSV file discovery and parsing using Polars.

use polars::prelude::*;
use std::path::{Path, PathBuf};

use super::schema::{SchemaError, SchemaRegistry};

/// Extension recognized as a tabular source file.
pub const CSV_EXTENSION: &str = "csv";

/// Rows sampled for type inference when a table has no declared schema.
pub const INFER_SCHEMA_ROWS: usize = 10_000;

/// Loads raw CSV files into DataFrames, applying declared schemas when known.
pub struct DataLoader {
    registry: SchemaRegistry,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new(SchemaRegistry::inventory())
    }
}

impl DataLoader {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Load a CSV file destined for `table`.
    ///
    /// With a registered descriptor every column is read as text and then cast
    /// strictly. Without one, types are inferred from the leading rows; malformed
    /// rows still fail the load.
    pub fn load_csv(&self, file_path: &Path, table: &str) -> Result<DataFrame, SchemaError> {
        match self.registry.get(table) {
            Some(schema) => {
                let raw = CsvReadOptions::default()
                    .with_has_header(true)
                    .with_infer_schema_length(Some(0))
                    .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
                    .finish()?;
                schema.apply(&raw)
            }
            None => {
                let df = LazyCsvReader::new(file_path)
                    .with_has_header(true)
                    .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
                    .finish()?
                    .collect()?;
                Ok(df)
            }
        }
    }
}

/// Destination table name for a source file: its name minus the extension.
pub fn table_name_for(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// CSV files directly inside `dir`, sorted by file name.
pub fn list_csv_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(CSV_EXTENSION));
        if is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::{ScalarType, TableSchema};
    use std::fs;

    #[test]
    fn table_name_strips_extension() {
        assert_eq!(
            table_name_for(Path::new("data/vendor_invoice.csv")).as_deref(),
            Some("vendor_invoice")
        );
        assert_eq!(table_name_for(Path::new("sales.CSV")).as_deref(), Some("sales"));
    }

    #[test]
    fn lists_only_csv_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("a.CSV"), "x\n1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore").unwrap();
        fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let names: Vec<String> = list_csv_files(dir.path())
            .unwrap()
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }

    #[test]
    fn declared_schema_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        fs::write(&path, "Brand,Volume\n58,750\n62,\n").unwrap();

        let mut registry = SchemaRegistry::new();
        registry.register(
            "prices",
            TableSchema::new(&[("Brand", ScalarType::Integer), ("Volume", ScalarType::Text)]),
        );
        let df = DataLoader::new(registry).load_csv(&path, "prices").unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.column("Brand").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("Volume").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("Volume").unwrap().null_count(), 1);
    }

    #[test]
    fn declared_schema_mismatch_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        fs::write(&path, "Brand,Volume\nabc,750\n").unwrap();

        let mut registry = SchemaRegistry::new();
        registry.register(
            "prices",
            TableSchema::new(&[("Brand", ScalarType::Integer), ("Volume", ScalarType::Text)]),
        );
        let err = DataLoader::new(registry).load_csv(&path, "prices").unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn undeclared_table_infers_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("begin_inventory.csv");
        fs::write(&path, "Store,onHand,City\n1,12,Hardersfield\n2,8,Ashborne\n").unwrap();

        let df = DataLoader::default()
            .load_csv(&path, "begin_inventory")
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.column("onHand").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("City").unwrap().dtype(), &DataType::String);
    }
}
