use thiserror::Error;

/// Errors that can occur while serving code analytics.
#[derive(Error, Debug)]
pub enum CodeAnalysisError {
    #[error("config error: {message}")]
    Config { message: String },

    #[error("graph error: {message} (operation: {operation})")]
    Graph { message: String, operation: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),
}

impl CodeAnalysisError {
    /// Shorthand for a `Graph` error raised by the named operation.
    pub fn graph(operation: &str, message: impl Into<String>) -> Self {
        Self::Graph {
            message: message.into(),
            operation: operation.to_string(),
        }
    }
}

/// Convenience alias for results using `CodeAnalysisError`.
pub type Result<T> = std::result::Result<T, CodeAnalysisError>;
