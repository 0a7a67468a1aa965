use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unsupported data source kind: {0}")]
    UnsupportedSource(String),

    #[error("Invalid data source configuration: {0}")]
    InvalidSource(String),

    #[error("Data source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("Introspection error: {0}")]
    Introspection(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("No SQL statement found in model output")]
    NoQueryFound,

    #[error("Model output contained more than one SQL statement")]
    MultipleStatements,

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Retry budget exhausted after {attempts} attempts. Last error: {last_error}")]
    RetriesExhausted { attempts: u8, last_error: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the failure is the caller's fault (bad request) rather than
    /// a pipeline or source failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::UnsupportedSource(_) | PipelineError::InvalidSource(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
