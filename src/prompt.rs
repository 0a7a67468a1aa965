//! Prompt composition
//!
//! Builds the exact generation request from the dialect, schema summary,
//! conversation history, and current question. A pure formatting function:
//! retry context arrives already embedded in the question text.

use crate::schema::SchemaSummary;
use crate::source::Dialect;

pub const DEFAULT_ROW_LIMIT: usize = 100;

const NO_HISTORY_MARKER: &str = "No prior conversation.";

pub fn compose(
    dialect: Dialect,
    schema: &SchemaSummary,
    history: &[String],
    question: &str,
    row_limit: usize,
) -> String {
    let mut parts = Vec::new();

    parts.push(format!(
        "You are an expert {} analyst. Translate the question below into one {} query.",
        dialect.name(),
        dialect.name()
    ));

    match dialect {
        Dialect::MySql => {
            parts.push(
                "If the question asks for the available tables, query \
                 information_schema.tables for the current database."
                    .to_string(),
            );
        }
        Dialect::Sqlite => {
            parts.push(
                "If the question asks for the available tables, query sqlite_master \
                 WHERE type = 'table'."
                    .to_string(),
            );
        }
    }

    parts.push(
        "Select only the columns needed to answer the question. Never use SELECT *.".to_string(),
    );
    parts.push(
        "Produce exactly one SQL statement. Do not chain statements with semicolons.".to_string(),
    );
    parts.push(format!(
        "Unless the question asks for fewer rows, cap the result with LIMIT {}.",
        row_limit
    ));

    parts.push("\nSCHEMA:".to_string());
    parts.push(schema.render());

    parts.push("\nCONVERSATION HISTORY:".to_string());
    if history.is_empty() {
        parts.push(NO_HISTORY_MARKER.to_string());
    } else {
        parts.push(history.join("\n"));
    }

    parts.push(format!("\nQuestion: {}", question));
    parts.push("SQLQuery:".to_string());

    parts.join("\n")
}
