//! Wire models for the HTTP surface.

use crate::error::Result;
use crate::schema::SchemaSummary;
use crate::source::DataSourceDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,

    /// Absent means the legacy single-database mode.
    pub db_connection: Option<DbConnection>,

    #[serde(default)]
    pub history: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SchemaRequest {
    pub db_connection: DbConnection,
}

#[derive(Debug, Deserialize)]
pub struct DbConnection {
    #[serde(rename = "type")]
    pub kind: String,
    pub config: Value,
}

impl DbConnection {
    pub fn descriptor(&self) -> Result<DataSourceDescriptor> {
        DataSourceDescriptor::from_wire(&self.kind, &self.config)
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub question: String,
    pub sql: String,
    pub data: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub tables: Vec<SchemaTable>,
    pub relationships: Vec<SchemaRelationship>,
}

#[derive(Debug, Serialize)]
pub struct SchemaTable {
    pub name: String,
    pub columns: Vec<SchemaColumn>,
}

#[derive(Debug, Serialize)]
pub struct SchemaColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaRelationship {
    pub from: String,
    pub to: String,
    pub cols: Vec<String>,
    #[serde(rename = "refCols")]
    pub ref_cols: Vec<String>,
}

impl From<SchemaSummary> for SchemaResponse {
    fn from(summary: SchemaSummary) -> Self {
        let relationships = summary
            .tables
            .iter()
            .flat_map(|table| table.relationships.iter().cloned())
            .map(|r| SchemaRelationship {
                from: r.from_table,
                to: r.to_table,
                cols: r.from_columns,
                ref_cols: r.to_columns,
            })
            .collect();

        SchemaResponse {
            tables: summary
                .tables
                .into_iter()
                .map(|table| SchemaTable {
                    name: table.name,
                    columns: table
                        .columns
                        .into_iter()
                        .map(|c| SchemaColumn {
                            name: c.name,
                            data_type: c.data_type,
                        })
                        .collect(),
                })
                .collect(),
            relationships,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_request_parses_wire_shape() {
        let body = json!({
            "question": "list all names",
            "db_connection": {
                "type": "csv",
                "config": { "csvContent": "id,name\n1,Alice" }
            },
            "history": ["earlier question"]
        });
        let request: QueryRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.question, "list all names");
        assert_eq!(request.history.len(), 1);
        request.db_connection.unwrap().descriptor().unwrap();
    }

    #[test]
    fn history_and_connection_are_optional() {
        let request: QueryRequest =
            serde_json::from_value(json!({ "question": "q" })).unwrap();
        assert!(request.db_connection.is_none());
        assert!(request.history.is_empty());
    }

    #[test]
    fn schema_response_flattens_relationships() {
        use crate::schema::{ColumnSchema, Relationship, TableSchema};
        let summary = SchemaSummary {
            tables: vec![TableSchema {
                name: "orders".to_string(),
                columns: vec![ColumnSchema {
                    name: "id".to_string(),
                    data_type: "int".to_string(),
                }],
                relationships: vec![Relationship {
                    from_table: "orders".to_string(),
                    to_table: "customers".to_string(),
                    from_columns: vec!["customer_id".to_string()],
                    to_columns: vec!["id".to_string()],
                }],
            }],
        };
        let response: SchemaResponse = summary.into();
        let rendered = serde_json::to_value(&response).unwrap();
        assert_eq!(rendered["tables"][0]["columns"][0]["type"], "int");
        assert_eq!(rendered["relationships"][0]["from"], "orders");
        assert_eq!(rendered["relationships"][0]["refCols"][0], "id");
    }
}
