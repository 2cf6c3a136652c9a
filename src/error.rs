use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Intent validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("SQL generation failed: {0}")]
    Compilation(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::Execution(err.to_string())
    }
}

impl QueryError {
    /// Whether the failure was caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, QueryError::Validation(_) | QueryError::Schema(_))
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
