use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Cannot parse config: {0}")]
    ConfigParsingError(String),
    /// Backend not reachable yet. The only error class retried by [`crate::backoff::Backoff`].
    #[error("Backend unreachable: {0}")]
    Unreachable(String),
    #[error("Backend still unreachable after {elapsed:?}: {last}")]
    ConnectTimeout { elapsed: Duration, last: String },
    #[error("Query error: {0}")]
    QueryError(String),
    #[error("Insert error: {0}")]
    InsertError(String),
    #[error("{backend} does not support {query}")]
    Unsupported { backend: String, query: String },
    #[error("Stress queue closed: {0}")]
    QueueClosed(String),
    #[error("{role} task failed: {message}")]
    TaskFailed { role: String, message: String },
}

impl BenchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BenchError::Unreachable(_))
    }
}

impl From<config::ConfigError> for BenchError {
    fn from(err: config::ConfigError) -> Self {
        BenchError::ConfigParsingError(err.to_string())
    }
}

impl From<clickhouse::error::Error> for BenchError {
    fn from(err: clickhouse::error::Error) -> Self {
        match &err {
            clickhouse::error::Error::Network(_) => BenchError::Unreachable(err.to_string()),
            _ => BenchError::QueryError(err.to_string()),
        }
    }
}

impl From<tokio_postgres::Error> for BenchError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Errors without a server-side SQLSTATE never reached the server.
        if err.code().is_none() && !err.is_closed() {
            BenchError::Unreachable(err.to_string())
        } else {
            BenchError::QueryError(err.to_string())
        }
    }
}

impl From<mongodb::error::Error> for BenchError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => {
                BenchError::Unreachable(err.to_string())
            }
            _ => BenchError::QueryError(err.to_string()),
        }
    }
}
