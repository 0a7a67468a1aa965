//! Result serialization
//!
//! Converts raw engine cell values into JSON-safe values. Temporal values
//! become ISO-8601 strings, exact decimals become floats, everything else
//! passes through unchanged. Row objects keep the statement's result-column
//! order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

/// A single result cell as decoded from the engine, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Time(NaiveTime),
    Decimal(Decimal),
}

/// One result row: column name and value, in result-column order.
pub type Row = Vec<(String, CellValue)>;

/// Serialize a single cell to a JSON-safe value.
pub fn to_json(value: &CellValue) -> Value {
    match value {
        CellValue::Null => Value::Null,
        CellValue::Bool(b) => Value::Bool(*b),
        CellValue::Int(i) => Value::Number((*i).into()),
        CellValue::UInt(u) => Value::Number((*u).into()),
        CellValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Bytes(b) => Value::String(hex_string(b)),
        CellValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        CellValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        CellValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        CellValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        CellValue::Decimal(d) => d
            .to_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(d.to_string())),
    }
}

/// Serialize one row to a JSON object, preserving column order.
pub fn row_to_json(row: &Row) -> Value {
    let mut object = Map::new();
    for (name, cell) in row {
        object.insert(name.clone(), to_json(cell));
    }
    Value::Object(object)
}

pub fn rows_to_json(rows: &[Row]) -> Vec<Value> {
    rows.iter().map(row_to_json).collect()
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_becomes_iso8601_string() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        assert_eq!(
            to_json(&CellValue::Date(date)),
            Value::String("2025-01-15".to_string())
        );
    }

    #[test]
    fn datetime_becomes_iso8601_string() {
        let dt = NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(
            to_json(&CellValue::DateTime(dt)),
            Value::String("2025-01-15T09:30:00".to_string())
        );
    }

    #[test]
    fn decimal_becomes_float() {
        let decimal = Decimal::new(12345, 2); // 123.45
        let json = to_json(&CellValue::Decimal(decimal));
        assert_eq!(json.as_f64(), Some(123.45));
    }

    #[test]
    fn integers_and_strings_pass_through() {
        assert_eq!(to_json(&CellValue::Int(42)), Value::Number(42.into()));
        assert_eq!(
            to_json(&CellValue::Text("Alice".to_string())),
            Value::String("Alice".to_string())
        );
    }

    #[test]
    fn mixed_row_serializes_each_cell_independently() {
        let row: Row = vec![
            (
                "created".to_string(),
                CellValue::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            ),
            ("amount".to_string(), CellValue::Decimal(Decimal::new(995, 1))),
            ("qty".to_string(), CellValue::Int(3)),
            ("label".to_string(), CellValue::Text("order".to_string())),
        ];
        let json = row_to_json(&row);
        assert_eq!(json["created"], Value::String("2024-06-01".to_string()));
        assert_eq!(json["amount"].as_f64(), Some(99.5));
        assert_eq!(json["qty"], Value::Number(3.into()));
        assert_eq!(json["label"], Value::String("order".to_string()));
    }

    #[test]
    fn row_keeps_column_order() {
        let row: Row = vec![
            ("zeta".to_string(), CellValue::Int(1)),
            ("alpha".to_string(), CellValue::Int(2)),
        ];
        let rendered = serde_json::to_string(&row_to_json(&row)).unwrap();
        assert!(rendered.find("zeta").unwrap() < rendered.find("alpha").unwrap());
    }

    #[test]
    fn nan_float_serializes_as_null() {
        assert_eq!(to_json(&CellValue::Float(f64::NAN)), Value::Null);
    }

    #[test]
    fn bytes_render_as_hex() {
        assert_eq!(
            to_json(&CellValue::Bytes(vec![0xde, 0xad])),
            Value::String("dead".to_string())
        );
    }
}
