//! Per-request pipeline orchestration
//!
//! Builds a queryable handle for one request, introspects it, runs the
//! execution loop, serializes the rows, and releases the handle on every
//! exit path. No state survives the request that created it.

use crate::api::{QueryResponse, SchemaResponse};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::execution_loop::QueryLoop;
use crate::llm::SqlGenerator;
use crate::schema;
use crate::serialize;
use crate::source::{DataSourceDescriptor, QueryableHandle, SourceAdapter};
use tracing::info;

pub struct Pipeline {
    adapter: SourceAdapter,
    query_loop: QueryLoop,
}

impl Pipeline {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            adapter: SourceAdapter::new(config.uploads_dir.clone()),
            query_loop: QueryLoop::new(config.max_attempts, config.row_limit),
        }
    }

    /// Answer one question against one data source.
    pub async fn run_query(
        &self,
        generator: &dyn SqlGenerator,
        descriptor: &DataSourceDescriptor,
        question: &str,
        history: &[String],
    ) -> Result<QueryResponse> {
        let handle = self.adapter.build(descriptor).await?;
        let result = self
            .query_on_handle(&handle, generator, question, history)
            .await;
        handle.close().await;
        result
    }

    async fn query_on_handle(
        &self,
        handle: &QueryableHandle,
        generator: &dyn SqlGenerator,
        question: &str,
        history: &[String],
    ) -> Result<QueryResponse> {
        let schema = schema::introspect(handle).await?;
        let outcome = self
            .query_loop
            .run(handle, generator, &schema, history, question)
            .await?;

        info!(
            "Answered in {} attempt(s): {}",
            outcome.attempts.len(),
            outcome.sql
        );
        Ok(QueryResponse {
            question: outcome.question,
            sql: outcome.sql,
            data: serialize::rows_to_json(&outcome.rows),
        })
    }

    /// Introspect one data source without generating anything.
    pub async fn fetch_schema(&self, descriptor: &DataSourceDescriptor) -> Result<SchemaResponse> {
        let handle = self.adapter.build(descriptor).await?;
        let result = schema::introspect(&handle).await;
        handle.close().await;
        Ok(result?.into())
    }
}
