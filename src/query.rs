//! Summary Query Module
//! Runs the vendor summary aggregation and reads result sets into DataFrames.

use duckdb::arrow::datatypes::DataType as ArrowType;
use duckdb::params;
use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use polars::prelude::*;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::db::{quote_ident, Database};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Query '{query}' failed: {source}")]
    Database {
        query: String,
        #[source]
        source: duckdb::Error,
    },
    #[error("Failed to build result frame: {0}")]
    Dataset(#[from] PolarsError),
    #[error("Column '{column}' returned unsupported value {value}")]
    UnsupportedValue { column: String, value: String },
    #[error("Query '{0}' produced no result set")]
    NoResultSet(String),
}

/// Name of the cleaned summary table written by preprocessing.
pub const VENDOR_SUMMARY_TABLE: &str = "vendor_sales_summary";

/// Per-(vendor, brand) purchase totals joined with sales and freight totals.
///
/// Purchases are the anchor of both outer joins. Rows with a non-positive
/// purchase price are dropped before aggregation. Sums are cast so that integer
/// totals come back as BIGINT and money as DOUBLE.
pub const VENDOR_SUMMARY_SQL: &str = r#"
WITH FreightSummary AS (
    SELECT
        VendorNumber,
        CAST(SUM(Freight) AS DOUBLE) AS FreightCost
    FROM vendor_invoice
    GROUP BY VendorNumber
),
PurchaseSummary AS (
    SELECT
        p.VendorNumber,
        p.VendorName,
        p.Brand,
        p.Description,
        p.PurchasePrice,
        pp.Price AS ActualPrice,
        pp.Volume,
        CAST(SUM(p.Quantity) AS BIGINT) AS TotalPurchaseQuantity,
        CAST(SUM(p.Dollars) AS DOUBLE) AS TotalPurchaseDollars
    FROM purchases p
    LEFT JOIN purchase_prices pp
        ON p.Brand = pp.Brand
    WHERE p.PurchasePrice > 0
    GROUP BY p.VendorNumber, p.VendorName, p.Brand, p.Description,
             p.PurchasePrice, pp.Price, pp.Volume
),
SalesSummary AS (
    SELECT
        VendorNo,
        Brand,
        CAST(SUM(SalesQuantity) AS BIGINT) AS TotalSalesQuantity,
        CAST(SUM(SalesDollars) AS DOUBLE) AS TotalSalesDollars,
        CAST(SUM(SalesPrice) AS DOUBLE) AS TotalSalesPrice,
        CAST(SUM(ExciseTax) AS DOUBLE) AS TotalExciseTax
    FROM sales
    GROUP BY VendorNo, Brand
)
SELECT
    ps.VendorNumber,
    ps.VendorName,
    ps.Brand,
    ps.Description,
    ps.PurchasePrice,
    ps.ActualPrice,
    ps.Volume,
    ps.TotalPurchaseQuantity,
    ps.TotalPurchaseDollars,
    ss.TotalSalesQuantity,
    ss.TotalSalesDollars,
    ss.TotalSalesPrice,
    ss.TotalExciseTax,
    fs.FreightCost
FROM PurchaseSummary ps
LEFT JOIN SalesSummary ss
    ON ps.VendorNumber = ss.VendorNo
    AND ps.Brand = ss.Brand
LEFT JOIN FreightSummary fs
    ON ps.VendorNumber = fs.VendorNumber
ORDER BY ps.TotalPurchaseDollars DESC
"#;

/// Build the raw vendor summary from the ingested inventory tables.
pub fn compute_vendor_summary(db: &Database) -> Result<DataFrame, QueryError> {
    let start = Instant::now();
    let df = read_query(db, "vendor_summary", VENDOR_SUMMARY_SQL).inspect_err(|e| {
        error!(error = %e, "vendor summary query failed");
    })?;
    info!(
        rows = df.height(),
        seconds = start.elapsed().as_secs_f64(),
        "vendor summary query executed"
    );
    Ok(df)
}

/// Read every row of `table`.
pub fn read_table(db: &Database, table: &str) -> Result<DataFrame, QueryError> {
    let sql = format!("SELECT * FROM {}", quote_ident(table));
    read_query(db, table, &sql)
}

/// Run `sql` and collect the full result set.
///
/// Column types follow the result schema: signed integer columns become
/// Int64, unsigned ones UInt64, floating and decimal columns Float64, booleans
/// Boolean, everything else String. Dates, times and timestamps are rendered
/// in ISO 8601 form.
pub fn read_query(db: &Database, label: &str, sql: &str) -> Result<DataFrame, QueryError> {
    let db_err = |source| QueryError::Database {
        query: label.to_string(),
        source,
    };

    let mut stmt = db.connection().prepare(sql).map_err(db_err)?;
    let mut rows = stmt.query(params![]).map_err(db_err)?;

    let (names, mut buffers) = {
        let executed = rows
            .as_ref()
            .ok_or_else(|| QueryError::NoResultSet(label.to_string()))?;
        let names = executed.column_names();
        let buffers: Vec<ColumnBuffer> = (0..names.len())
            .map(|i| ColumnBuffer::for_type(&executed.column_type(i)))
            .collect();
        (names, buffers)
    };

    while let Some(row) = rows.next().map_err(db_err)? {
        for (i, buffer) in buffers.iter_mut().enumerate() {
            let value: Value = row.get(i).map_err(db_err)?;
            buffer.push(value).map_err(|value| QueryError::UnsupportedValue {
                column: names[i].clone(),
                value,
            })?;
        }
    }

    let columns = names
        .into_iter()
        .zip(buffers)
        .map(|(name, buffer)| buffer.into_column(name))
        .collect();
    Ok(DataFrame::new(columns)?)
}

enum ColumnBuffer {
    Int(Vec<Option<i64>>),
    UInt(Vec<Option<u64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuffer {
    fn for_type(dtype: &ArrowType) -> Self {
        match dtype {
            ArrowType::Int8
            | ArrowType::Int16
            | ArrowType::Int32
            | ArrowType::Int64
            | ArrowType::UInt8
            | ArrowType::UInt16
            | ArrowType::UInt32 => ColumnBuffer::Int(Vec::new()),
            ArrowType::UInt64 => ColumnBuffer::UInt(Vec::new()),
            ArrowType::Float16
            | ArrowType::Float32
            | ArrowType::Float64
            | ArrowType::Decimal128(..)
            | ArrowType::Decimal256(..) => ColumnBuffer::Float(Vec::new()),
            ArrowType::Boolean => ColumnBuffer::Bool(Vec::new()),
            _ => ColumnBuffer::Text(Vec::new()),
        }
    }

    /// Append one cell; an unrepresentable value is returned as its debug text.
    fn push(&mut self, value: Value) -> Result<(), String> {
        match self {
            ColumnBuffer::Int(values) => values.push(match value {
                Value::Null => None,
                Value::TinyInt(v) => Some(v.into()),
                Value::SmallInt(v) => Some(v.into()),
                Value::Int(v) => Some(v.into()),
                Value::BigInt(v) => Some(v),
                Value::UTinyInt(v) => Some(v.into()),
                Value::USmallInt(v) => Some(v.into()),
                Value::UInt(v) => Some(v.into()),
                Value::UBigInt(v) => Some(i64::try_from(v).map_err(|_| v.to_string())?),
                Value::HugeInt(v) => Some(i64::try_from(v).map_err(|_| v.to_string())?),
                other => return Err(format!("{other:?}")),
            }),
            ColumnBuffer::UInt(values) => values.push(match value {
                Value::Null => None,
                Value::UTinyInt(v) => Some(v.into()),
                Value::USmallInt(v) => Some(v.into()),
                Value::UInt(v) => Some(v.into()),
                Value::UBigInt(v) => Some(v),
                Value::BigInt(v) => Some(u64::try_from(v).map_err(|_| v.to_string())?),
                Value::HugeInt(v) => Some(u64::try_from(v).map_err(|_| v.to_string())?),
                other => return Err(format!("{other:?}")),
            }),
            ColumnBuffer::Float(values) => values.push(match value {
                Value::Null => None,
                Value::Float(v) => Some(v.into()),
                Value::Double(v) => Some(v),
                Value::Decimal(d) => {
                    let text = d.to_string();
                    Some(text.parse::<f64>().map_err(|_| text)?)
                }
                Value::TinyInt(v) => Some(v.into()),
                Value::SmallInt(v) => Some(v.into()),
                Value::Int(v) => Some(v.into()),
                Value::BigInt(v) => Some(v as f64),
                Value::HugeInt(v) => Some(v as f64),
                other => return Err(format!("{other:?}")),
            }),
            ColumnBuffer::Bool(values) => values.push(match value {
                Value::Null => None,
                Value::Boolean(v) => Some(v),
                other => return Err(format!("{other:?}")),
            }),
            ColumnBuffer::Text(values) => values.push(match value {
                Value::Null => None,
                Value::Text(v) => Some(v),
                other => Some(render_text(other)),
            }),
        }
        Ok(())
    }

    fn into_column(self, name: String) -> Column {
        let name: PlSmallStr = name.into();
        match self {
            ColumnBuffer::Int(values) => Column::new(name, values),
            ColumnBuffer::UInt(values) => Column::new(name, values),
            ColumnBuffer::Float(values) => Column::new(name, values),
            ColumnBuffer::Bool(values) => Column::new(name, values),
            ColumnBuffer::Text(values) => Column::new(name, values),
        }
    }
}

/// Days between 0001-01-01 and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn time_of_day(micros: i64) -> Option<NaiveTime> {
    let secs = u32::try_from(micros / 1_000_000).ok()?;
    let sub_micros = u32::try_from(micros % 1_000_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, sub_micros * 1_000)
}

/// Text form of a non-string cell. Temporal values use ISO 8601; anything
/// out of range, or without a natural text form, falls back to debug output.
fn render_text(value: Value) -> String {
    let rendered = match &value {
        Value::Boolean(v) => Some(v.to_string()),
        Value::Decimal(d) => Some(d.to_string()),
        Value::Date32(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|date| date.to_string()),
        Value::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(*unit, *v))
            .map(|ts| ts.naive_utc().to_string()),
        Value::Time64(unit, v) => time_of_day(to_micros(*unit, *v)).map(|t| t.to_string()),
        Value::Interval {
            months,
            days,
            nanos,
        } => {
            let seconds = *nanos as f64 / 1e9;
            Some(format!("P{months}M{days}DT{seconds}S"))
        }
        _ => None,
    };
    rendered.unwrap_or_else(|| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture::capture_logs;

    fn seed(db: &Database, sql: &str) {
        db.connection().execute_batch(sql).unwrap();
    }

    fn inventory(db: &Database) {
        seed(
            db,
            r#"
            CREATE TABLE purchases (VendorNumber BIGINT, VendorName VARCHAR, Brand BIGINT,
                Description VARCHAR, PurchasePrice DOUBLE, Quantity BIGINT, Dollars DOUBLE);
            CREATE TABLE purchase_prices (Brand BIGINT, Price DOUBLE, Volume VARCHAR);
            CREATE TABLE sales (VendorNo BIGINT, Brand BIGINT, SalesQuantity BIGINT,
                SalesDollars DOUBLE, SalesPrice DOUBLE, ExciseTax DOUBLE);
            CREATE TABLE vendor_invoice (VendorNumber BIGINT, Freight DOUBLE);

            INSERT INTO purchases VALUES
                (1, 'ALTAMAR BRANDS', 10, 'Vodka', 5.0, 10, 50.0),
                (1, 'ALTAMAR BRANDS', 10, 'Vodka', 5.0, 20, 100.0),
                (1, 'ALTAMAR BRANDS', 11, 'Gin', 0.0, 99, 999.0),
                (2, 'BACARDI USA', 20, 'Rum', 8.0, 50, 400.0),
                (3, 'CAMPARI', 30, 'Aperitif', 2.0, 5, 10.0);
            INSERT INTO purchase_prices VALUES (10, 7.99, '750'), (20, 12.99, '1750');
            INSERT INTO sales VALUES
                (1, 10, 25, 199.75, 7.99, 1.5),
                (2, 20, 40, 519.60, 12.99, 2.0),
                (2, 20, 2, 25.98, 12.99, 0.1);
            INSERT INTO vendor_invoice VALUES (1, 3.5), (1, 1.5), (2, 9.0);
            "#,
        );
    }

    #[test]
    fn summary_aggregates_and_orders_by_purchase_dollars() {
        let db = Database::in_memory().unwrap();
        inventory(&db);

        let df = compute_vendor_summary(&db).unwrap();
        assert_eq!(df.height(), 3);

        let brands = df.column("Brand").unwrap().i64().unwrap();
        assert_eq!(brands.into_iter().collect::<Vec<_>>(), vec![Some(20), Some(10), Some(30)]);

        let dollars = df.column("TotalPurchaseDollars").unwrap().f64().unwrap();
        assert_eq!(dollars.get(0), Some(400.0));
        assert_eq!(dollars.get(1), Some(150.0));

        let qty = df.column("TotalPurchaseQuantity").unwrap().i64().unwrap();
        assert_eq!(qty.get(1), Some(30));

        let sales_qty = df.column("TotalSalesQuantity").unwrap().i64().unwrap();
        assert_eq!(sales_qty.get(0), Some(42));

        let freight = df.column("FreightCost").unwrap().f64().unwrap();
        assert_eq!(freight.get(1), Some(5.0));
    }

    #[test]
    fn summary_logs_row_count_and_duration() {
        let db = Database::in_memory().unwrap();
        inventory(&db);

        let (df, logs) = capture_logs(|| compute_vendor_summary(&db));
        assert_eq!(df.unwrap().height(), 3);
        assert!(logs.contains("vendor summary query executed"), "{logs}");
        assert!(logs.contains("rows=3"), "{logs}");
        assert!(logs.contains("seconds="), "{logs}");
    }

    #[test]
    fn zero_purchase_price_rows_are_excluded() {
        let db = Database::in_memory().unwrap();
        inventory(&db);

        let df = compute_vendor_summary(&db).unwrap();
        let brands = df.column("Brand").unwrap().i64().unwrap();
        assert!(brands.into_iter().all(|b| b != Some(11)));
    }

    #[test]
    fn purchases_without_sales_are_kept_with_nulls() {
        let db = Database::in_memory().unwrap();
        inventory(&db);

        let df = compute_vendor_summary(&db).unwrap();
        // Brand 30 has no sales, freight or price rows
        let row = 2;
        assert_eq!(df.column("Brand").unwrap().i64().unwrap().get(row), Some(30));
        assert_eq!(df.column("TotalSalesQuantity").unwrap().i64().unwrap().get(row), None);
        assert_eq!(df.column("TotalSalesDollars").unwrap().f64().unwrap().get(row), None);
        assert_eq!(df.column("FreightCost").unwrap().f64().unwrap().get(row), None);
        assert_eq!(df.column("Volume").unwrap().str().unwrap().get(row), None);
    }

    #[test]
    fn missing_tables_fail_with_query_error() {
        let db = Database::in_memory().unwrap();
        let err = compute_vendor_summary(&db).unwrap_err();
        assert!(matches!(err, QueryError::Database { ref query, .. } if query == "vendor_summary"));
    }

    #[test]
    fn decimal_columns_read_as_float() {
        let db = Database::in_memory().unwrap();
        seed(
            &db,
            "CREATE TABLE prices (Price DECIMAL(10,2));
             INSERT INTO prices VALUES (12.50), (NULL), (0.99);",
        );

        let df = read_table(&db, "prices").unwrap();
        let prices = df.column("Price").unwrap();
        assert_eq!(prices.dtype(), &DataType::Float64);
        let values: Vec<Option<f64>> = prices.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(12.5), None, Some(0.99)]);
    }

    #[test]
    fn unsigned_bigint_keeps_full_range() {
        let db = Database::in_memory().unwrap();
        seed(
            &db,
            "CREATE TABLE counters (n UBIGINT);
             INSERT INTO counters VALUES (18446744073709551615), (0);",
        );

        let df = read_table(&db, "counters").unwrap();
        let counters = df.column("n").unwrap();
        assert_eq!(counters.dtype(), &DataType::UInt64);
        assert_eq!(counters.u64().unwrap().get(0), Some(u64::MAX));
        assert_eq!(counters.u64().unwrap().get(1), Some(0));
    }

    #[test]
    fn temporal_values_render_as_iso_text() {
        let db = Database::in_memory().unwrap();
        seed(
            &db,
            "CREATE TABLE invoices (PODate DATE, ReceivedAt TIMESTAMP, PaidAt TIME);
             INSERT INTO invoices VALUES
                 (DATE '2024-01-01', TIMESTAMP '2024-01-05 08:30:00', TIME '17:45:30'),
                 (DATE '1969-12-31', NULL, NULL);",
        );

        let df = read_table(&db, "invoices").unwrap();
        let dates = df.column("PODate").unwrap().str().unwrap();
        assert_eq!(dates.get(0), Some("2024-01-01"));
        assert_eq!(dates.get(1), Some("1969-12-31"));
        let received = df.column("ReceivedAt").unwrap().str().unwrap();
        assert_eq!(received.get(0), Some("2024-01-05 08:30:00"));
        assert_eq!(received.get(1), None);
        let paid = df.column("PaidAt").unwrap().str().unwrap();
        assert_eq!(paid.get(0), Some("17:45:30"));
    }

    #[test]
    fn read_query_keeps_schema_for_empty_results() {
        let db = Database::in_memory().unwrap();
        seed(&db, "CREATE TABLE t (a BIGINT, b DOUBLE, c VARCHAR, d BOOLEAN);");

        let df = read_table(&db, "t").unwrap();
        assert_eq!(df.height(), 0);
        let dtypes: Vec<DataType> = df.dtypes();
        assert_eq!(
            dtypes,
            vec![DataType::Int64, DataType::Float64, DataType::String, DataType::Boolean]
        );
    }
}
