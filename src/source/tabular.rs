//! Tabular source adapter
//!
//! Loads delimited text, inline or from the uploads directory, into an
//! ephemeral in-memory SQLite store under one fixed table name. Tabular
//! sources are then queried through the embedded dialect like any other
//! handle. Construction replaces any prior content under that name, so each
//! request must build its own isolated handle.

use crate::error::{PipelineError, Result};
use crate::serialize::{CellValue, Row};
use crate::source::QueryableHandle;
use csv::ReaderBuilder;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// The single table every tabular source is loaded under.
pub const TABLE_NAME: &str = "data";

#[derive(Debug, Clone, Deserialize)]
pub struct CsvConfig {
    /// Inline CSV text.
    #[serde(rename = "csvContent")]
    pub csv_content: Option<String>,

    /// Reference to a previously uploaded file, resolved against the
    /// uploads directory.
    #[serde(rename = "csvPath")]
    pub csv_path: Option<String>,
}

pub fn load(config: &CsvConfig, uploads_dir: &Path) -> Result<QueryableHandle> {
    let text = match (&config.csv_content, &config.csv_path) {
        (Some(content), _) => content.clone(),
        (None, Some(reference)) => read_upload(uploads_dir, reference)?,
        (None, None) => {
            return Err(PipelineError::InvalidSource(
                "csv source requires csvContent or csvPath".to_string(),
            ))
        }
    };

    let conn = Connection::open_in_memory()
        .map_err(|e| PipelineError::SourceUnreachable(e.to_string()))?;
    populate(&conn, &text)?;
    Ok(QueryableHandle::Sqlite(Mutex::new(conn)))
}

/// Resolve an upload reference to a file inside the uploads directory.
/// Only the basename is honored, so references cannot traverse outside it.
fn read_upload(uploads_dir: &Path, reference: &str) -> Result<String> {
    let path = resolve_upload(uploads_dir, reference)?;
    std::fs::read_to_string(&path).map_err(|e| {
        PipelineError::SourceUnreachable(format!("upload {}: {}", path.display(), e))
    })
}

pub fn resolve_upload(uploads_dir: &Path, reference: &str) -> Result<PathBuf> {
    let name = Path::new(reference)
        .file_name()
        .ok_or_else(|| PipelineError::InvalidSource(format!("invalid csvPath: {}", reference)))?;
    Ok(uploads_dir.join(name))
}

/// Parse the CSV text and (re)create the fixed table from it.
pub(crate) fn populate(conn: &Connection, csv_text: &str) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::InvalidSource(format!("CSV headers: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.is_empty() {
        return Err(PipelineError::InvalidSource(
            "CSV content has no header row".to_string(),
        ));
    }

    let mut records: Vec<Vec<CellValue>> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| PipelineError::InvalidSource(format!("CSV row: {}", e)))?;
        let cells = headers
            .iter()
            .enumerate()
            .map(|(index, _)| coerce_cell(record.get(index).unwrap_or("")))
            .collect();
        records.push(cells);
    }

    let column_defs = headers
        .iter()
        .enumerate()
        .map(|(index, name)| {
            format!(
                "{} {}",
                quote_ident(name),
                column_affinity(&records, index)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    conn.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(TABLE_NAME)), [])
        .map_err(sql_error)?;
    conn.execute(
        &format!("CREATE TABLE {} ({})", quote_ident(TABLE_NAME), column_defs),
        [],
    )
    .map_err(sql_error)?;

    let placeholders = (1..=headers.len())
        .map(|n| format!("?{}", n))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(TABLE_NAME),
        headers
            .iter()
            .map(|h| quote_ident(h))
            .collect::<Vec<_>>()
            .join(", "),
        placeholders
    );

    let mut statement = conn.prepare(&insert).map_err(sql_error)?;
    for record in &records {
        let params: Vec<SqlValue> = record.iter().map(bind_value).collect();
        statement
            .execute(rusqlite::params_from_iter(params))
            .map_err(sql_error)?;
    }

    info!(
        "Loaded {} rows into in-memory table '{}'",
        records.len(),
        TABLE_NAME
    );
    Ok(headers)
}

/// Best-effort typed coercion of one CSV cell.
fn coerce_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CellValue::Null;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return CellValue::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return CellValue::Float(f);
    }
    CellValue::Text(trimmed.to_string())
}

/// Pick a declared column type from the coerced cells of one column.
fn column_affinity(records: &[Vec<CellValue>], index: usize) -> &'static str {
    let mut all_int = true;
    let mut all_numeric = true;
    let mut saw_value = false;
    for record in records {
        match &record[index] {
            CellValue::Null => {}
            CellValue::Int(_) | CellValue::Bool(_) => saw_value = true,
            CellValue::Float(_) => {
                saw_value = true;
                all_int = false;
            }
            _ => {
                saw_value = true;
                all_int = false;
                all_numeric = false;
            }
        }
    }
    if !saw_value {
        "TEXT"
    } else if all_int {
        "INTEGER"
    } else if all_numeric {
        "REAL"
    } else {
        "TEXT"
    }
}

fn bind_value(cell: &CellValue) -> SqlValue {
    match cell {
        CellValue::Null => SqlValue::Null,
        CellValue::Bool(b) => SqlValue::Integer(*b as i64),
        CellValue::Int(i) => SqlValue::Integer(*i),
        CellValue::Float(f) => SqlValue::Real(*f),
        CellValue::Text(s) => SqlValue::Text(s.clone()),
        // Coercion never produces the remaining variants.
        _ => SqlValue::Null,
    }
}

pub(crate) fn fetch_rows(conn: &Connection, sql: &str) -> Result<Vec<Row>> {
    let mut statement = conn
        .prepare(sql)
        .map_err(|e| PipelineError::Execution(e.to_string()))?;
    let column_names: Vec<String> = statement
        .column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();

    let mut rows = statement
        .query([])
        .map_err(|e| PipelineError::Execution(e.to_string()))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .map_err(|e| PipelineError::Execution(e.to_string()))?
    {
        let mut decoded: Row = Vec::with_capacity(column_names.len());
        for (index, name) in column_names.iter().enumerate() {
            let cell = match row
                .get_ref(index)
                .map_err(|e| PipelineError::Execution(e.to_string()))?
            {
                rusqlite::types::ValueRef::Null => CellValue::Null,
                rusqlite::types::ValueRef::Integer(i) => CellValue::Int(i),
                rusqlite::types::ValueRef::Real(f) => CellValue::Float(f),
                rusqlite::types::ValueRef::Text(t) => {
                    CellValue::Text(String::from_utf8_lossy(t).to_string())
                }
                rusqlite::types::ValueRef::Blob(b) => CellValue::Bytes(b.to_vec()),
            };
            decoded.push((name.clone(), cell));
        }
        out.push(decoded);
    }
    Ok(out)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_error(e: rusqlite::Error) -> PipelineError {
    PipelineError::Execution(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inline(content: &str) -> CsvConfig {
        CsvConfig {
            csv_content: Some(content.to_string()),
            csv_path: None,
        }
    }

    #[tokio::test]
    async fn build_then_probe_succeeds() {
        let handle = load(&inline("id,name\n1,Alice\n2,Bob"), Path::new("uploads")).unwrap();
        handle.probe().await.unwrap();
    }

    #[tokio::test]
    async fn loads_rows_under_fixed_table_name() {
        let handle = load(&inline("id,name\n1,Alice\n2,Bob"), Path::new("uploads")).unwrap();
        let rows = handle.fetch_all("SELECT name FROM data ORDER BY id").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], ("name".to_string(), CellValue::Text("Alice".to_string())));
        assert_eq!(rows[1][0], ("name".to_string(), CellValue::Text("Bob".to_string())));
    }

    #[tokio::test]
    async fn numeric_columns_get_numeric_affinity() {
        let handle = load(
            &inline("id,amount,label\n1,10.5,a\n2,2,b"),
            Path::new("uploads"),
        )
        .unwrap();
        let rows = handle
            .fetch_all("SELECT SUM(id) AS total, SUM(amount) AS amt FROM data")
            .await
            .unwrap();
        assert_eq!(rows[0][0].1, CellValue::Int(3));
        assert_eq!(rows[0][1].1, CellValue::Float(12.5));
    }

    #[test]
    fn repopulate_replaces_prior_content() {
        let conn = Connection::open_in_memory().unwrap();
        populate(&conn, "id\n1\n2\n3").unwrap();
        populate(&conn, "name\nonly").unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn upload_reference_cannot_traverse() {
        let path = resolve_upload(Path::new("/srv/uploads"), "../../etc/passwd").unwrap();
        assert_eq!(path, Path::new("/srv/uploads/passwd"));
    }

    #[test]
    fn missing_content_and_path_is_invalid() {
        let err = load(
            &CsvConfig {
                csv_content: None,
                csv_path: None,
            },
            Path::new("uploads"),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSource(_)));
    }

    #[test]
    fn empty_cells_are_null() {
        assert_eq!(coerce_cell("  "), CellValue::Null);
        assert_eq!(coerce_cell("true"), CellValue::Bool(true));
        assert_eq!(coerce_cell("7"), CellValue::Int(7));
        assert_eq!(coerce_cell("7.5"), CellValue::Float(7.5));
        assert_eq!(coerce_cell("x"), CellValue::Text("x".to_string()));
    }
}
