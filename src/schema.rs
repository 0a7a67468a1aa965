//! Schema introspection
//!
//! Enumerates tables, columns, and inter-table references through a
//! queryable handle. Derived fresh per request so the summary always
//! reflects the handle's current structure.

use crate::error::{PipelineError, Result};
use crate::source::QueryableHandle;
use itertools::Itertools;
use rusqlite::Connection;
use serde::Serialize;
use sqlx::MySqlPool;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

/// A foreign-key style reference between two tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub from_table: String,
    pub to_table: String,
    pub from_columns: Vec<String>,
    pub to_columns: Vec<String>,
}

pub async fn introspect(handle: &QueryableHandle) -> Result<SchemaSummary> {
    match handle {
        QueryableHandle::MySql(pool) => introspect_mysql(pool).await,
        QueryableHandle::Sqlite(conn) => {
            let conn = crate::source::handle::lock(conn)?;
            introspect_sqlite(&conn)
        }
    }
}

async fn introspect_mysql(pool: &MySqlPool) -> Result<SchemaSummary> {
    let table_names: Vec<(String,)> = sqlx::query_as(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() ORDER BY table_name",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| PipelineError::Introspection(e.to_string()))?;

    let mut tables = Vec::with_capacity(table_names.len());
    for (name,) in table_names {
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name, column_type FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? \
             ORDER BY ordinal_position",
        )
        .bind(&name)
        .fetch_all(pool)
        .await
        .map_err(|e| PipelineError::Introspection(e.to_string()))?;

        // A reference-metadata failure is recorded as absent for this table
        // only; introspection continues for the remaining tables.
        let relationships = match fetch_relationships(pool, &name).await {
            Ok(relationships) => relationships,
            Err(e) => {
                warn!("Skipping relationships for table '{}': {}", name, e);
                Vec::new()
            }
        };

        tables.push(TableSchema {
            name,
            columns: columns
                .into_iter()
                .map(|(name, data_type)| ColumnSchema { name, data_type })
                .collect(),
            relationships,
        });
    }

    Ok(SchemaSummary { tables })
}

async fn fetch_relationships(pool: &MySqlPool, table: &str) -> Result<Vec<Relationship>> {
    let references: Vec<(String, String, String, String)> = sqlx::query_as(
        "SELECT constraint_name, column_name, referenced_table_name, referenced_column_name \
         FROM information_schema.key_column_usage \
         WHERE table_schema = DATABASE() AND table_name = ? \
           AND referenced_table_name IS NOT NULL \
         ORDER BY constraint_name, ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|e| PipelineError::Introspection(e.to_string()))?;

    // Composite keys arrive as one row per column; group per constraint.
    let mut grouped: BTreeMap<(String, String), (Vec<String>, Vec<String>)> = BTreeMap::new();
    for (constraint, column, referenced_table, referenced_column) in references {
        let entry = grouped
            .entry((constraint, referenced_table))
            .or_default();
        entry.0.push(column);
        entry.1.push(referenced_column);
    }

    Ok(grouped
        .into_iter()
        .map(
            |((_, to_table), (from_columns, to_columns))| Relationship {
                from_table: table.to_string(),
                to_table,
                from_columns,
                to_columns,
            },
        )
        .collect())
}

/// No reference metadata exists for ephemeral tabular stores, so none is
/// enumerated.
fn introspect_sqlite(conn: &Connection) -> Result<SchemaSummary> {
    let mut statement = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(|e| PipelineError::Introspection(e.to_string()))?;
    let names: Vec<String> = statement
        .query_map([], |row| row.get(0))
        .map_err(|e| PipelineError::Introspection(e.to_string()))?
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| PipelineError::Introspection(e.to_string()))?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let pragma = format!("PRAGMA table_info({})", quote_ident(&name));
        let mut statement = conn
            .prepare(&pragma)
            .map_err(|e| PipelineError::Introspection(e.to_string()))?;
        let columns: Vec<ColumnSchema> = statement
            .query_map([], |row| {
                Ok(ColumnSchema {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                })
            })
            .map_err(|e| PipelineError::Introspection(e.to_string()))?
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PipelineError::Introspection(e.to_string()))?;

        tables.push(TableSchema {
            name,
            columns,
            relationships: Vec::new(),
        });
    }

    Ok(SchemaSummary { tables })
}

impl SchemaSummary {
    /// Render the summary as the schema context embedded in a generation
    /// request.
    pub fn render(&self) -> String {
        if self.tables.is_empty() {
            return "(no tables)".to_string();
        }
        self.tables
            .iter()
            .map(|table| {
                let columns = table
                    .columns
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.data_type))
                    .join(", ");
                let mut rendered = format!("Table {}: {}", table.name, columns);
                for relationship in &table.relationships {
                    rendered.push_str(&format!(
                        "\n  References {}: ({}) -> ({})",
                        relationship.to_table,
                        relationship.from_columns.join(", "),
                        relationship.to_columns.join(", ")
                    ));
                }
                rendered
            })
            .join("\n")
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
