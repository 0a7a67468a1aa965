// End-to-end pipeline tests over tabular sources: CSV content in, JSON rows
// out, with a scripted generator standing in for the completion service.

use async_trait::async_trait;
use queryforge::api::DbConnection;
use queryforge::config::ServiceConfig;
use queryforge::error::{PipelineError, Result};
use queryforge::llm::SqlGenerator;
use queryforge::pipeline::Pipeline;
use queryforge::source::{CsvConfig, DataSourceDescriptor};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl SqlGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PipelineError::Generation("script exhausted".to_string()))
    }
}

fn test_config() -> ServiceConfig {
    // Environment-independent defaults; only uploads_dir matters here.
    let mut config = ServiceConfig::from_env();
    config.max_attempts = 3;
    config.row_limit = 100;
    config
}

fn csv_descriptor(content: &str) -> DataSourceDescriptor {
    DataSourceDescriptor::Csv(CsvConfig {
        csv_content: Some(content.to_string()),
        csv_path: None,
    })
}

#[tokio::test]
async fn csv_question_returns_serialized_rows() {
    let pipeline = Pipeline::new(&test_config());
    let generator =
        ScriptedGenerator::new(&["```sql\nSELECT name FROM data ORDER BY id\n```"]);

    let response = pipeline
        .run_query(
            &generator,
            &csv_descriptor("id,name\n1,Alice\n2,Bob"),
            "list all names",
            &[],
        )
        .await
        .unwrap();

    assert_eq!(response.question, "list all names");
    assert_eq!(response.sql, "SELECT name FROM data ORDER BY id");
    assert_eq!(
        response.data,
        vec![json!({"name": "Alice"}), json!({"name": "Bob"})]
    );
}

#[tokio::test]
async fn empty_result_set_is_empty_not_null() {
    let pipeline = Pipeline::new(&test_config());
    let generator = ScriptedGenerator::new(&["SELECT name FROM data WHERE id > 99"]);

    let response = pipeline
        .run_query(
            &generator,
            &csv_descriptor("id,name\n1,Alice"),
            "names above id 99",
            &[],
        )
        .await
        .unwrap();

    assert!(response.data.is_empty());
}

#[tokio::test]
async fn failing_statement_is_corrected_on_the_next_attempt() {
    let pipeline = Pipeline::new(&test_config());
    let generator = ScriptedGenerator::new(&[
        "SELECT full_name FROM data",
        "SELECT name FROM data ORDER BY id",
    ]);

    let response = pipeline
        .run_query(
            &generator,
            &csv_descriptor("id,name\n1,Alice\n2,Bob"),
            "list all names",
            &[],
        )
        .await
        .unwrap();

    assert_eq!(response.data.len(), 2);
}

#[tokio::test]
async fn persistent_failure_exhausts_the_budget() {
    let pipeline = Pipeline::new(&test_config());
    let generator = ScriptedGenerator::new(&[
        "SELECT bad FROM data",
        "SELECT bad FROM data",
        "SELECT bad FROM data",
    ]);

    let err = pipeline
        .run_query(&generator, &csv_descriptor("id\n1"), "q", &[])
        .await
        .unwrap_err();

    match err {
        PipelineError::RetriesExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("bad"));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn schema_endpoint_shape_for_csv_source() {
    let pipeline = Pipeline::new(&test_config());
    let response = pipeline
        .fetch_schema(&csv_descriptor("id,name\n1,Alice"))
        .await
        .unwrap();

    let rendered = serde_json::to_value(&response).unwrap();
    assert_eq!(rendered["tables"][0]["name"], "data");
    assert_eq!(rendered["tables"][0]["columns"][0]["name"], "id");
    assert_eq!(rendered["tables"][0]["columns"][0]["type"], "INTEGER");
    assert_eq!(rendered["relationships"], json!([]));
}

#[tokio::test]
async fn unsupported_connection_kind_is_a_client_error() {
    let connection: DbConnection = serde_json::from_value(json!({
        "type": "mongodb",
        "config": {}
    }))
    .unwrap();

    let err = connection.descriptor().unwrap_err();
    assert!(err.is_client_error());
    assert!(matches!(err, PipelineError::UnsupportedSource(kind) if kind == "mongodb"));
}

#[tokio::test]
async fn numeric_and_text_cells_serialize_naturally() {
    let pipeline = Pipeline::new(&test_config());
    let generator =
        ScriptedGenerator::new(&["SELECT id, amount, name FROM data ORDER BY id"]);

    let response = pipeline
        .run_query(
            &generator,
            &csv_descriptor("id,amount,name\n1,9.5,Alice\n2,2.25,Bob"),
            "everything",
            &[],
        )
        .await
        .unwrap();

    assert_eq!(
        response.data[0],
        json!({"id": 1, "amount": 9.5, "name": "Alice"})
    );
}
