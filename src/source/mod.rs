//! Source adapters
//!
//! Turns a declared data-source description into a uniform queryable handle,
//! whether the backing store is a live MySQL database or an in-memory table
//! built from CSV content.

pub mod handle;
pub mod relational;
pub mod tabular;

pub use handle::{Dialect, QueryableHandle};
pub use relational::MySqlConfig;
pub use tabular::CsvConfig;

use crate::error::{PipelineError, Result};
use serde_json::Value;
use std::path::PathBuf;

/// A declared data source. One closed variant per supported kind; adding a
/// kind means adding a variant and a builder, nothing else.
#[derive(Debug, Clone)]
pub enum DataSourceDescriptor {
    MySql(MySqlConfig),
    Csv(CsvConfig),
}

impl DataSourceDescriptor {
    /// Build a descriptor from the wire shape `{ "type": ..., "config": ... }`.
    pub fn from_wire(kind: &str, config: &Value) -> Result<Self> {
        match kind {
            "mysql" => {
                let config: MySqlConfig = serde_json::from_value(config.clone())
                    .map_err(|e| PipelineError::InvalidSource(format!("mysql config: {}", e)))?;
                Ok(DataSourceDescriptor::MySql(config))
            }
            "csv" => {
                let config: CsvConfig = serde_json::from_value(config.clone())
                    .map_err(|e| PipelineError::InvalidSource(format!("csv config: {}", e)))?;
                Ok(DataSourceDescriptor::Csv(config))
            }
            other => Err(PipelineError::UnsupportedSource(other.to_string())),
        }
    }
}

/// Builds request-scoped queryable handles from descriptors.
pub struct SourceAdapter {
    uploads_dir: PathBuf,
}

impl SourceAdapter {
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self { uploads_dir }
    }

    /// Construct a handle for one request. The caller owns the handle and
    /// must release it when the request completes.
    pub async fn build(&self, descriptor: &DataSourceDescriptor) -> Result<QueryableHandle> {
        match descriptor {
            DataSourceDescriptor::MySql(config) => relational::connect(config).await,
            DataSourceDescriptor::Csv(config) => tabular::load(config, &self.uploads_dir),
        }
    }
}
