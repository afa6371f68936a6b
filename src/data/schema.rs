//! Table Schema Module
//! Explicit column descriptors applied when raw CSV files are parsed.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to parse CSV: {0}")]
    Parse(#[from] PolarsError),
    #[error("Header mismatch: expected {expected:?}, found {found:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Column '{column}' declared as {expected} but contains '{value}'")]
    TypeMismatch {
        column: String,
        expected: ScalarType,
        value: String,
    },
}

/// Scalar types a raw table column may be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Text,
    Integer,
    Float,
}

impl ScalarType {
    pub fn dtype(self) -> DataType {
        match self {
            ScalarType::Text => DataType::String,
            ScalarType::Integer => DataType::Int64,
            ScalarType::Float => DataType::Float64,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Text => "text",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub scalar: ScalarType,
}

/// Ordered column descriptor for one table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(columns: &[(&str, ScalarType)]) -> Self {
        Self {
            columns: columns
                .iter()
                .map(|(name, scalar)| ColumnSpec {
                    name: name.to_string(),
                    scalar: *scalar,
                })
                .collect(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Apply this descriptor to a frame whose columns were all read as text.
    ///
    /// Headers must match the declared columns exactly and in order. Empty
    /// cells are already null; any other cell that does not parse as the
    /// declared type is reported with its column and raw value.
    pub fn apply(&self, raw: &DataFrame) -> Result<DataFrame, SchemaError> {
        let found: Vec<String> = raw
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let expected = self.column_names();
        if found != expected {
            return Err(SchemaError::ColumnMismatch { expected, found });
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        for spec in &self.columns {
            let source = raw.column(&spec.name)?;
            let target = spec.scalar.dtype();
            if source.dtype() == &target {
                columns.push(source.clone());
                continue;
            }

            let cast = source.cast(&target)?;
            if cast.null_count() != source.null_count() {
                let value = first_rejected(source, &cast)?.unwrap_or_default();
                return Err(SchemaError::TypeMismatch {
                    column: spec.name.clone(),
                    expected: spec.scalar,
                    value,
                });
            }
            columns.push(cast);
        }

        Ok(DataFrame::new(columns)?)
    }
}

/// First value that was present in `source` but became null in `cast`.
fn first_rejected(source: &Column, cast: &Column) -> PolarsResult<Option<String>> {
    let text = source.cast(&DataType::String)?;
    let text = text.str()?;
    let nulls = cast.is_null();
    let rejected = text
        .into_iter()
        .zip(nulls.into_iter())
        .find_map(|(value, became_null)| match (value, became_null) {
            (Some(v), Some(true)) => Some(v.to_string()),
            _ => None,
        });
    Ok(rejected)
}

/// Table name to schema lookup used by the directory loader.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
}

impl SchemaRegistry {
    /// An empty registry: every file is parsed with inferred types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptors for the inventory tables read by the vendor summary query.
    pub fn inventory() -> Self {
        use ScalarType::{Float, Integer, Text};

        let mut registry = Self::new();
        registry.register(
            "purchases",
            TableSchema::new(&[
                ("InventoryId", Text),
                ("Store", Integer),
                ("Brand", Integer),
                ("Description", Text),
                ("Size", Text),
                ("VendorNumber", Integer),
                ("VendorName", Text),
                ("PONumber", Integer),
                ("PODate", Text),
                ("ReceivingDate", Text),
                ("InvoiceDate", Text),
                ("PayDate", Text),
                ("PurchasePrice", Float),
                ("Quantity", Integer),
                ("Dollars", Float),
                ("Classification", Integer),
            ]),
        );
        registry.register(
            "purchase_prices",
            TableSchema::new(&[
                ("Brand", Integer),
                ("Description", Text),
                ("Price", Float),
                ("Size", Text),
                ("Volume", Text),
                ("Classification", Integer),
                ("PurchasePrice", Float),
                ("VendorNumber", Integer),
                ("VendorName", Text),
            ]),
        );
        registry.register(
            "sales",
            TableSchema::new(&[
                ("InventoryId", Text),
                ("Store", Integer),
                ("Brand", Integer),
                ("Description", Text),
                ("Size", Text),
                ("SalesQuantity", Integer),
                ("SalesDollars", Float),
                ("SalesPrice", Float),
                ("SalesDate", Text),
                ("Volume", Float),
                ("Classification", Integer),
                ("ExciseTax", Float),
                ("VendorNo", Integer),
                ("VendorName", Text),
            ]),
        );
        registry.register(
            "vendor_invoice",
            TableSchema::new(&[
                ("VendorNumber", Integer),
                ("VendorName", Text),
                ("InvoiceDate", Text),
                ("PONumber", Integer),
                ("PODate", Text),
                ("PayDate", Text),
                ("Quantity", Integer),
                ("Dollars", Float),
                ("Freight", Float),
                ("Approval", Text),
            ]),
        );
        registry
    }

    pub fn register(&mut self, table: &str, schema: TableSchema) {
        self.tables.insert(table.to_string(), schema);
    }

    pub fn get(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(table)
    }
}
