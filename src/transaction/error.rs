//! Transaction error types.

use thiserror::Error;

use crate::adapter::ConnectionError;
use crate::transaction::primitive::PrimitiveState;
use crate::transaction::scope::ScopeState;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur while driving transaction primitives.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The adapter already has a primitive in this transaction scope.
    #[error("already a primitive for connection provider {adapter}")]
    DuplicatePrimitive { adapter: String },

    /// Operation invoked out of begin -> commit/rollback -> close order.
    #[error("cannot {operation} a transaction primitive in state {state}")]
    InvalidState {
        operation: &'static str,
        state: PrimitiveState,
    },

    /// Scope operation invoked out of link -> begin -> commit/rollback order.
    #[error("cannot {operation} a transaction scope in state {state}")]
    InvalidScopeState {
        operation: &'static str,
        state: ScopeState,
    },

    /// The backend rejected a statement.
    #[error("statement {sql:?} failed: {source}")]
    StatementExecution {
        sql: String,
        #[source]
        source: ConnectionError,
    },

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransactionError {
    /// Check if this error signals misuse of the API rather than a backend failure.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            TransactionError::DuplicatePrimitive { .. }
                | TransactionError::InvalidState { .. }
                | TransactionError::InvalidScopeState { .. }
        )
    }

    /// The backend error, if the backend rejected a statement.
    pub fn connection_error(&self) -> Option<&ConnectionError> {
        match self {
            TransactionError::StatementExecution { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Create a statement execution error.
    pub(crate) fn statement(sql: String, source: ConnectionError) -> Self {
        Self::StatementExecution { sql, source }
    }

    /// Create an invalid primitive state error.
    pub(crate) fn invalid_state(operation: &'static str, state: PrimitiveState) -> Self {
        Self::InvalidState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let duplicate = TransactionError::DuplicatePrimitive {
            adapter: "default".to_string(),
        };
        assert!(duplicate.is_programming_error());
        assert!(duplicate.connection_error().is_none());

        let failed = TransactionError::StatementExecution {
            sql: "SAVEPOINT \"x\"".to_string(),
            source: ConnectionError::NoTransaction,
        };
        assert!(!failed.is_programming_error());
        assert_eq!(
            failed.connection_error(),
            Some(&ConnectionError::NoTransaction)
        );
    }

    #[test]
    fn test_error_messages() {
        let err = TransactionError::invalid_state("commit", PrimitiveState::Pending);
        assert_eq!(
            err.to_string(),
            "cannot commit a transaction primitive in state pending"
        );

        let err = TransactionError::DuplicatePrimitive {
            adapter: "default".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "already a primitive for connection provider default"
        );
    }
}
