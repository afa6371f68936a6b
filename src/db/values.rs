use duckdb::types::Value;
use polars::prelude::{AnyValue, DataType};

/// SQL column type used when creating a table for a frame column.
pub fn sql_type_for(dtype: &DataType) -> &'static str {
    match dtype {
        DataType::Boolean => "BOOLEAN",
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => "BIGINT",
        DataType::UInt64 => "UBIGINT",
        DataType::Float32 | DataType::Float64 => "DOUBLE",
        _ => "VARCHAR",
    }
}

/// Convert one frame cell into a bindable SQL parameter.
pub fn any_to_sql(value: AnyValue<'_>) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(v) => Value::Boolean(v),
        AnyValue::Int8(v) => Value::BigInt(v.into()),
        AnyValue::Int16(v) => Value::BigInt(v.into()),
        AnyValue::Int32(v) => Value::BigInt(v.into()),
        AnyValue::Int64(v) => Value::BigInt(v),
        AnyValue::UInt8(v) => Value::BigInt(v.into()),
        AnyValue::UInt16(v) => Value::BigInt(v.into()),
        AnyValue::UInt32(v) => Value::BigInt(v.into()),
        AnyValue::UInt64(v) => Value::UBigInt(v),
        AnyValue::Float32(v) => Value::Double(v.into()),
        AnyValue::Float64(v) => Value::Double(v),
        AnyValue::String(v) => Value::Text(v.to_string()),
        AnyValue::StringOwned(v) => Value::Text(v.to_string()),
        other => Value::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_scalar_types() {
        assert_eq!(sql_type_for(&DataType::Int32), "BIGINT");
        assert_eq!(sql_type_for(&DataType::Float32), "DOUBLE");
        assert_eq!(sql_type_for(&DataType::String), "VARCHAR");
        assert_eq!(sql_type_for(&DataType::Null), "VARCHAR");
    }

    #[test]
    fn converts_cells() {
        assert_eq!(any_to_sql(AnyValue::Null), Value::Null);
        assert_eq!(any_to_sql(AnyValue::Int32(7)), Value::BigInt(7));
        assert_eq!(any_to_sql(AnyValue::Float64(2.5)), Value::Double(2.5));
        assert_eq!(
            any_to_sql(AnyValue::String("Ketel One")),
            Value::Text("Ketel One".to_string())
        );
    }
}
