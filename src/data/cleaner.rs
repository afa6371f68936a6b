//! Data Cleaner Module
//! Normalizes the vendor summary and derives its financial ratio columns.

use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CleaningError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("Missing required column '{0}'")]
    MissingColumn(String),
    #[error("Column '{column}' has non-numeric value '{value}'")]
    Coercion { column: String, value: String },
}

pub const VOLUME: &str = "Volume";
pub const VENDOR_NAME: &str = "VendorName";
pub const DESCRIPTION: &str = "Description";
pub const TOTAL_SALES_DOLLARS: &str = "TotalSalesDollars";
pub const TOTAL_PURCHASE_DOLLARS: &str = "TotalPurchaseDollars";
pub const TOTAL_SALES_QUANTITY: &str = "TotalSalesQuantity";
pub const TOTAL_PURCHASE_QUANTITY: &str = "TotalPurchaseQuantity";

pub const GROSS_PROFIT: &str = "GrossProfit";
pub const PROFIT_MARGIN: &str = "ProfitMargin";
pub const STOCK_TURNOVER: &str = "StockTurnover";
pub const SALES_TO_PURCHASE_RATIO: &str = "SalesToPurchaseRatio";

const REQUIRED_COLUMNS: [&str; 7] = [
    VOLUME,
    VENDOR_NAME,
    DESCRIPTION,
    TOTAL_SALES_DOLLARS,
    TOTAL_PURCHASE_DOLLARS,
    TOTAL_SALES_QUANTITY,
    TOTAL_PURCHASE_QUANTITY,
];

const TRIMMED_COLUMNS: [&str; 2] = [VENDOR_NAME, DESCRIPTION];

/// Cleans the vendor summary table produced by the summary query.
pub struct DataCleaner;

impl DataCleaner {
    /// Clean a vendor summary frame.
    ///
    /// Steps run in a fixed order: Volume becomes Float64, nulls become zero,
    /// text keys are trimmed, the four ratio columns are (re)computed and any
    /// infinite or NaN float produced along the way is replaced with zero.
    /// Row count and order are preserved and the result is a fixed point.
    pub fn clean(df: &DataFrame) -> Result<DataFrame, CleaningError> {
        Self::require_columns(df)?;

        let mut df = df.clone();
        Self::coerce_volume(&mut df)?;
        let df = Self::fill_nulls(&df)?;
        let df = Self::trim_text(&df)?;
        let df = Self::derive_ratios(df)?;
        let (df, infinities) = Self::neutralize_non_finite(&df)?;

        if infinities > 0 {
            warn!(infinite_values = infinities, "replaced infinite values with zero");
        }
        debug!(rows = df.height(), columns = df.width(), "cleaned vendor summary");
        Ok(df)
    }

    fn require_columns(df: &DataFrame) -> Result<(), CleaningError> {
        for name in REQUIRED_COLUMNS {
            if df.column(name).is_err() {
                return Err(CleaningError::MissingColumn(name.to_string()));
            }
        }
        Ok(())
    }

    fn coerce_volume(df: &mut DataFrame) -> Result<(), CleaningError> {
        let column = df.column(VOLUME)?;
        let coerced = match column.dtype() {
            DataType::Float64 => return Ok(()),
            DataType::String => {
                let mut values: Vec<Option<f64>> = Vec::with_capacity(column.len());
                for raw in column.str()?.into_iter() {
                    let value = match raw.map(str::trim) {
                        None | Some("") => None,
                        Some(text) => Some(text.parse::<f64>().map_err(|_| {
                            CleaningError::Coercion {
                                column: VOLUME.to_string(),
                                value: text.to_string(),
                            }
                        })?),
                    };
                    values.push(value);
                }
                Column::new(VOLUME.into(), values)
            }
            _ => column.cast(&DataType::Float64)?,
        };
        df.with_column(coerced)?;
        Ok(())
    }

    fn fill_nulls(df: &DataFrame) -> Result<DataFrame, CleaningError> {
        let mut columns = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            if column.null_count() == 0 {
                columns.push(column.clone());
            } else if column.dtype() == &DataType::String {
                let filled: Vec<&str> = column
                    .str()?
                    .into_iter()
                    .map(|v| v.unwrap_or("0"))
                    .collect();
                columns.push(Column::new(column.name().clone(), filled));
            } else {
                // Numeric, boolean and all-null columns
                let series = column
                    .cast(&fill_dtype(column.dtype()))?
                    .as_materialized_series()
                    .fill_null(FillNullStrategy::Zero)?;
                columns.push(series.into());
            }
        }
        Ok(DataFrame::new(columns)?)
    }

    fn trim_text(df: &DataFrame) -> Result<DataFrame, CleaningError> {
        let mut df = df.clone();
        for name in TRIMMED_COLUMNS {
            let column = df.column(name)?;
            if column.dtype() != &DataType::String {
                continue;
            }
            let trimmed: Vec<Option<String>> = column
                .str()?
                .into_iter()
                .map(|v| v.map(|s| s.trim().to_string()))
                .collect();
            df.with_column(Column::new(name.into(), trimmed))?;
        }
        Ok(df)
    }

    fn derive_ratios(df: DataFrame) -> Result<DataFrame, CleaningError> {
        let f = |name: &str| col(name).cast(DataType::Float64);

        let df = df
            .lazy()
            .with_column(
                (f(TOTAL_SALES_DOLLARS) - f(TOTAL_PURCHASE_DOLLARS)).alias(GROSS_PROFIT),
            )
            .with_columns([
                (col(GROSS_PROFIT) / f(TOTAL_SALES_DOLLARS) * lit(100.0)).alias(PROFIT_MARGIN),
                (f(TOTAL_SALES_QUANTITY) / f(TOTAL_PURCHASE_QUANTITY)).alias(STOCK_TURNOVER),
                (f(TOTAL_SALES_DOLLARS) / f(TOTAL_PURCHASE_DOLLARS))
                    .alias(SALES_TO_PURCHASE_RATIO),
            ])
            .collect()?;
        Ok(df)
    }

    /// Replace ±inf and NaN in every float column with zero.
    ///
    /// Returns the cleaned frame and the number of infinite values found.
    fn neutralize_non_finite(df: &DataFrame) -> Result<(DataFrame, usize), CleaningError> {
        let mut infinities = 0usize;
        let mut columns = Vec::with_capacity(df.width());

        for column in df.get_columns() {
            if !matches!(column.dtype(), DataType::Float32 | DataType::Float64) {
                columns.push(column.clone());
                continue;
            }

            let as_f64 = column.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = as_f64
                .f64()?
                .into_iter()
                .map(|v| {
                    v.map(|x| {
                        if x.is_infinite() {
                            infinities += 1;
                            0.0
                        } else if x.is_nan() {
                            0.0
                        } else {
                            x
                        }
                    })
                })
                .collect();
            columns.push(Column::new(column.name().clone(), values));
        }

        Ok((DataFrame::new(columns)?, infinities))
    }
}

/// Zero-fill target type: integers and floats keep theirs, anything else
/// (booleans, all-null columns) is widened to Float64.
fn fill_dtype(dtype: &DataType) -> DataType {
    match dtype {
        DataType::Float32
        | DataType::Float64
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => dtype.clone(),
        _ => DataType::Float64,
    }
}
