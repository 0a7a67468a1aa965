//! Execution loop
//!
//! Bounded generate-execute loop with error feedback: compose a request,
//! generate, extract one statement, execute. On failure the literal error
//! text is appended to the question context and the loop re-enters
//! composition, up to a fixed attempt budget. The original question is
//! preserved verbatim; only the trailing failure annotation accumulates.

use crate::error::{PipelineError, Result};
use crate::extract;
use crate::llm::SqlGenerator;
use crate::prompt;
use crate::schema::SchemaSummary;
use crate::serialize::Row;
use crate::source::QueryableHandle;
use tracing::{info, warn};

/// One generate-execute attempt, recorded for instrumentation.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub attempt_index: u8,
    pub question_with_context: String,
    pub raw_model_output: Option<String>,
    pub extracted_sql: Option<String>,
    pub execution_error: Option<String>,
}

/// Terminal success artifact of the loop.
#[derive(Debug)]
pub struct QueryOutcome {
    pub question: String,
    pub sql: String,
    pub rows: Vec<Row>,
    pub attempts: Vec<GenerationAttempt>,
}

pub struct QueryLoop {
    max_attempts: u8,
    row_limit: usize,
}

impl QueryLoop {
    pub fn new(max_attempts: u8, row_limit: usize) -> Self {
        Self {
            max_attempts,
            row_limit,
        }
    }

    pub async fn run(
        &self,
        handle: &QueryableHandle,
        generator: &dyn SqlGenerator,
        schema: &SchemaSummary,
        history: &[String],
        question: &str,
    ) -> Result<QueryOutcome> {
        let dialect = handle.dialect();
        let mut question_with_context = question.to_string();
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            info!("Generation attempt {} of {}", attempt, self.max_attempts);

            let composed = prompt::compose(
                dialect,
                schema,
                history,
                &question_with_context,
                self.row_limit,
            );
            let mut record = GenerationAttempt {
                attempt_index: attempt,
                question_with_context: question_with_context.clone(),
                raw_model_output: None,
                extracted_sql: None,
                execution_error: None,
            };

            let raw = match generator.generate(&composed).await {
                Ok(raw) => raw,
                Err(e) => {
                    note_failure(&mut record, &mut attempts, &mut question_with_context, &mut last_error, attempt, e);
                    continue;
                }
            };
            record.raw_model_output = Some(raw.clone());

            let sql = match extract::extract(&raw)
                .and_then(|sql| extract::ensure_single_statement(&sql, dialect).map(|_| sql))
            {
                Ok(sql) => sql,
                Err(e) => {
                    note_failure(&mut record, &mut attempts, &mut question_with_context, &mut last_error, attempt, e);
                    continue;
                }
            };
            record.extracted_sql = Some(sql.clone());

            match handle.fetch_all(&sql).await {
                Ok(rows) => {
                    info!("Query succeeded on attempt {}", attempt);
                    attempts.push(record);
                    return Ok(QueryOutcome {
                        question: question.to_string(),
                        sql,
                        rows,
                        attempts,
                    });
                }
                Err(e) => {
                    note_failure(&mut record, &mut attempts, &mut question_with_context, &mut last_error, attempt, e);
                }
            }
        }

        Err(PipelineError::RetriesExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }
}

fn note_failure(
    record: &mut GenerationAttempt,
    attempts: &mut Vec<GenerationAttempt>,
    question_with_context: &mut String,
    last_error: &mut String,
    attempt: u8,
    error: PipelineError,
) {
    let message = error.to_string();
    warn!("Attempt {} failed: {}", attempt, message);
    record.execution_error = Some(message.clone());
    attempts.push(record.clone());
    *question_with_context = annotate(&*question_with_context, &message);
    *last_error = message;
}

/// Append the literal prior error to the question context for the next
/// attempt.
fn annotate(question: &str, error: &str) -> String {
    format!(
        "{}\n\nThe previous attempt failed with this error; generate a corrected query:\n{}",
        question, error
    )
}
