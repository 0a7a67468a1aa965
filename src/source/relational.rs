//! MySQL source adapter
//!
//! Builds a request-scoped connection pool from declared credentials and
//! decodes result rows into engine-neutral cells.

use crate::error::{PipelineError, Result};
use crate::serialize::{CellValue, Row};
use crate::source::QueryableHandle;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row as SqlxRow, TypeInfo};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct MySqlConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

fn default_port() -> u16 {
    3306
}

/// Connect and probe. Connection or auth failures surface immediately;
/// retrying generation cannot fix a dead connection.
pub async fn connect(config: &MySqlConfig) -> Result<QueryableHandle> {
    let url = connection_url(config);
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .map_err(|e| PipelineError::SourceUnreachable(e.to_string()))?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| PipelineError::SourceUnreachable(e.to_string()))?;

    Ok(QueryableHandle::MySql(pool))
}

pub fn connection_url(config: &MySqlConfig) -> String {
    let password = utf8_percent_encode(&config.password, NON_ALPHANUMERIC);
    format!(
        "mysql://{}:{}@{}:{}/{}",
        config.user,
        password,
        reachable_host(&config.host),
        config.port,
        config.database
    )
}

/// Inside a container, loopback addresses point at the container itself;
/// rewrite them to the host-reachable alias.
fn reachable_host(host: &str) -> String {
    let loopback = host == "localhost" || host == "127.0.0.1";
    if loopback && running_in_container() {
        "host.docker.internal".to_string()
    } else {
        host.to_string()
    }
}

fn running_in_container() -> bool {
    if let Ok(flag) = std::env::var("RUNNING_IN_DOCKER") {
        if flag == "1" || flag.eq_ignore_ascii_case("true") {
            return true;
        }
    }
    std::path::Path::new("/.dockerenv").exists()
}

pub(crate) async fn fetch_rows(pool: &MySqlPool, sql: &str) -> Result<Vec<Row>> {
    let rows = sqlx::query(sql)
        .fetch_all(pool)
        .await
        .map_err(|e| PipelineError::Execution(e.to_string()))?;

    Ok(rows.iter().map(decode_row).collect())
}

fn decode_row(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| (column.name().to_string(), decode_cell(row, index)))
        .collect()
}

fn decode_cell(row: &MySqlRow, index: usize) -> CellValue {
    let type_name = row.columns()[index].type_info().name();
    match type_name {
        "BOOLEAN" => opt(row.try_get::<Option<bool>, _>(index), CellValue::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            opt(row.try_get::<Option<i64>, _>(index), CellValue::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => opt(row.try_get::<Option<u64>, _>(index), CellValue::UInt),
        "FLOAT" => opt(row.try_get::<Option<f32>, _>(index), |f| {
            CellValue::Float(f as f64)
        }),
        "DOUBLE" => opt(row.try_get::<Option<f64>, _>(index), CellValue::Float),
        "DECIMAL" => opt(row.try_get::<Option<Decimal>, _>(index), CellValue::Decimal),
        "DATE" => opt(row.try_get::<Option<NaiveDate>, _>(index), CellValue::Date),
        "DATETIME" => opt(
            row.try_get::<Option<NaiveDateTime>, _>(index),
            CellValue::DateTime,
        ),
        "TIMESTAMP" => opt(
            row.try_get::<Option<DateTime<Utc>>, _>(index),
            CellValue::Timestamp,
        ),
        "TIME" => opt(row.try_get::<Option<NaiveTime>, _>(index), CellValue::Time),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            opt(row.try_get::<Option<Vec<u8>>, _>(index), CellValue::Bytes)
        }
        _ => fallback_cell(row, index),
    }
}

/// CHAR/VARCHAR/TEXT/ENUM/JSON and anything unrecognized: decode as text,
/// then raw bytes, before giving up as NULL.
fn fallback_cell(row: &MySqlRow, index: usize) -> CellValue {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map(CellValue::Text).unwrap_or(CellValue::Null);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return value.map(CellValue::Bytes).unwrap_or(CellValue::Null);
    }
    CellValue::Null
}

fn opt<T>(
    value: std::result::Result<Option<T>, sqlx::Error>,
    wrap: impl FnOnce(T) -> CellValue,
) -> CellValue {
    match value {
        Ok(Some(v)) => wrap(v),
        Ok(None) => CellValue::Null,
        Err(_) => CellValue::Null,
    }
}
