//! Data module - CSV loading, table schemas and cleaning

mod cleaner;
mod loader;
mod schema;

pub use cleaner::{CleaningError, DataCleaner};
pub use loader::{list_csv_files, table_name_for, DataLoader};
pub use schema::{ColumnSpec, ScalarType, SchemaError, SchemaRegistry, TableSchema};

/// Column names of the vendor summary table.
pub mod columns {
    pub use super::cleaner::{
        DESCRIPTION, GROSS_PROFIT, PROFIT_MARGIN, SALES_TO_PURCHASE_RATIO, STOCK_TURNOVER,
        TOTAL_PURCHASE_DOLLARS, TOTAL_PURCHASE_QUANTITY, TOTAL_SALES_DOLLARS,
        TOTAL_SALES_QUANTITY, VENDOR_NAME, VOLUME,
    };
}
