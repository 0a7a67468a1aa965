//! Queryable handle
//!
//! A live, request-scoped connection capable of executing statements against
//! one data source. Owned by the request that built it and released when the
//! request completes.

use crate::error::{PipelineError, Result};
use crate::serialize::Row;
use crate::source::{relational, tabular};
use rusqlite::Connection;
use sqlx::MySqlPool;
use std::sync::Mutex;

/// The SQL variant a generated statement must conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::MySql => "MySQL",
            Dialect::Sqlite => "SQLite",
        }
    }
}

/// An engine handle bound to exactly one data source for one request.
#[derive(Debug)]
pub enum QueryableHandle {
    MySql(MySqlPool),
    Sqlite(Mutex<Connection>),
}

impl QueryableHandle {
    pub fn dialect(&self) -> Dialect {
        match self {
            QueryableHandle::MySql(_) => Dialect::MySql,
            QueryableHandle::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Trivial probe query; succeeds iff the source is reachable.
    pub async fn probe(&self) -> Result<()> {
        match self {
            QueryableHandle::MySql(pool) => sqlx::query("SELECT 1")
                .execute(pool)
                .await
                .map(|_| ())
                .map_err(|e| PipelineError::SourceUnreachable(e.to_string())),
            QueryableHandle::Sqlite(conn) => {
                let conn = lock(conn)?;
                conn.query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(|e| PipelineError::SourceUnreachable(e.to_string()))
            }
        }
    }

    /// Execute one read statement and decode every row.
    pub async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>> {
        match self {
            QueryableHandle::MySql(pool) => relational::fetch_rows(pool, sql).await,
            QueryableHandle::Sqlite(conn) => {
                let conn = lock(conn)?;
                tabular::fetch_rows(&conn, sql)
            }
        }
    }

    /// Release the handle. In-memory stores are dropped with the handle.
    pub async fn close(self) {
        if let QueryableHandle::MySql(pool) = self {
            pool.close().await;
        }
    }
}

pub(crate) fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| PipelineError::Execution("tabular store lock poisoned".to_string()))
}
