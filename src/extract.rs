//! Query extraction
//!
//! Pure text transformation from free-form model output to one candidate
//! SQL statement: unwrap the first fenced code block, drop everything up to
//! a query marker, trim. Kept separate from the execution loop so the one
//! piece of format-sensitive logic stays independently testable.

use crate::error::{PipelineError, Result};
use crate::source::Dialect;
use regex::Regex;
use sqlparser::dialect::{MySqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use tracing::debug;

/// Markers some models emit before the statement. `SQLQuery:` must be
/// checked first since it contains `Query:`.
const QUERY_MARKERS: [&str; 2] = ["SQLQuery:", "Query:"];

/// Trailing sections some models append after the statement.
const STOP_MARKERS: [&str; 2] = ["SQLResult:", "Answer:"];

/// Reduce raw model output to a single candidate statement. Fails with
/// `NoQueryFound` when nothing remains after post-processing.
pub fn extract(raw: &str) -> Result<String> {
    let text = fenced_block(raw).unwrap_or_else(|| raw.to_string());
    let text = after_marker(&text);
    let text = before_stop_marker(text);
    let sql = text.trim();
    if sql.is_empty() {
        return Err(PipelineError::NoQueryFound);
    }
    Ok(sql.to_string())
}

/// Structural check that the candidate is one statement. Output that the
/// parser cannot understand at all is passed through so the engine reports
/// the real error.
pub fn ensure_single_statement(sql: &str, dialect: Dialect) -> Result<()> {
    let parsed = match dialect {
        Dialect::MySql => Parser::parse_sql(&MySqlDialect {}, sql),
        Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
    };
    match parsed {
        Ok(statements) if statements.len() > 1 => Err(PipelineError::MultipleStatements),
        Ok(_) => Ok(()),
        Err(e) => {
            debug!("Candidate statement did not parse ({}); deferring to the engine", e);
            Ok(())
        }
    }
}

/// Interior of the first fenced code block, with an optional language tag.
fn fenced_block(text: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```[a-zA-Z]*[ \t]*\r?\n?(.*?)```").ok()?;
    re.captures(text).map(|captures| captures[1].to_string())
}

fn after_marker(text: &str) -> &str {
    for marker in QUERY_MARKERS {
        if let Some(position) = text.find(marker) {
            return &text[position + marker.len()..];
        }
    }
    text
}

fn before_stop_marker(text: &str) -> &str {
    let end = STOP_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker))
        .min()
        .unwrap_or(text.len());
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_statement_is_trimmed() {
        assert_eq!(
            extract("  SELECT name FROM data \n").unwrap(),
            "SELECT name FROM data"
        );
    }

    #[test]
    fn fenced_block_interior_is_extracted() {
        let raw = "Here is the query:\n```sql\nSELECT name FROM data\n```\nHope that helps.";
        assert_eq!(extract(raw).unwrap(), "SELECT name FROM data");
    }

    #[test]
    fn untagged_fence_works_too() {
        let raw = "```\nSELECT 1\n```";
        assert_eq!(extract(raw).unwrap(), "SELECT 1");
    }

    #[test]
    fn only_first_fenced_block_is_used() {
        let raw = "```sql\nSELECT a FROM data\n```\ntext\n```sql\nSELECT b FROM data\n```";
        assert_eq!(extract(raw).unwrap(), "SELECT a FROM data");
    }

    #[test]
    fn query_marker_strips_preamble() {
        let raw = "Sure!\nSQLQuery: SELECT name FROM data";
        assert_eq!(extract(raw).unwrap(), "SELECT name FROM data");
    }

    #[test]
    fn marker_inside_fence_is_also_stripped() {
        let raw = "```sql\nSQLQuery: SELECT name FROM data\n```";
        assert_eq!(extract(raw).unwrap(), "SELECT name FROM data");
    }

    #[test]
    fn trailing_result_section_is_dropped() {
        let raw = "SQLQuery: SELECT COUNT(*) FROM users\nSQLResult: 100\nAnswer: there are 100";
        assert_eq!(extract(raw).unwrap(), "SELECT COUNT(*) FROM users");
    }

    #[test]
    fn round_trip_any_wrapping_yields_trimmed_statement() {
        let statement = "SELECT id, name\nFROM data\nWHERE id > 1";
        let wrappings = [
            statement.to_string(),
            format!("```sql\n{}\n```", statement),
            format!("Query: {}", statement),
            format!("```sql\nSQLQuery: {}\n```", statement),
        ];
        for wrapped in wrappings {
            assert_eq!(extract(&wrapped).unwrap(), statement.trim());
        }
    }

    #[test]
    fn empty_output_is_no_query_found() {
        assert!(matches!(extract("   \n"), Err(PipelineError::NoQueryFound)));
        assert!(matches!(
            extract("```sql\n```"),
            Err(PipelineError::NoQueryFound)
        ));
    }

    #[test]
    fn single_statement_passes_the_gate() {
        ensure_single_statement("SELECT name FROM data LIMIT 10", Dialect::Sqlite).unwrap();
        ensure_single_statement("SELECT 1", Dialect::MySql).unwrap();
    }

    #[test]
    fn multiple_statements_are_rejected() {
        let err = ensure_single_statement(
            "SELECT name FROM data; DROP TABLE data",
            Dialect::Sqlite,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::MultipleStatements));
    }

    #[test]
    fn trailing_semicolon_is_still_one_statement() {
        ensure_single_statement("SELECT name FROM data;", Dialect::Sqlite).unwrap();
    }

    #[test]
    fn unparseable_text_defers_to_the_engine() {
        ensure_single_statement("SELEKT garbage !!", Dialect::Sqlite).unwrap();
    }
}
