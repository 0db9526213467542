//! Connection error types.

use thiserror::Error;

/// Result type for statement execution.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors a connection reports when it rejects a statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("no transaction is open")]
    NoTransaction,

    #[error("a transaction is already open")]
    TransactionAlreadyOpen,

    #[error("no such savepoint: {0}")]
    NoSuchSavepoint(String),

    #[error("statement rejected: {0}")]
    Rejected(String),

    #[error("unsupported statement: {0}")]
    Unsupported(String),
}

impl From<sqlparser::parser::ParserError> for ConnectionError {
    fn from(e: sqlparser::parser::ParserError) -> Self {
        ConnectionError::Syntax(e.to_string())
    }
}
