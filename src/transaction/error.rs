//! Transaction error types.

use thiserror::Error;

use crate::executor::StatementError;
use crate::pool::AcquireError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Could not obtain a connection for a new transaction.
    #[error("connection acquisition failed: {0}")]
    Acquire(#[from] AcquireError),

    /// Commit, rollback, close or statement execution failed.
    #[error("statement execution failed: {0}")]
    Statement(#[from] StatementError),

    /// Pop on an empty connection context. Stack underflow never happens
    /// in correct usage; treat this as a bug, not a retryable condition.
    #[error("transaction stack is empty")]
    EmptyStack,

    /// An error raised by a caller-supplied unit of work, propagated
    /// unchanged.
    #[error(transparent)]
    App(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl TransactionError {
    /// Wrap an application error raised inside a unit of work.
    pub fn app(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::App(Box::new(err))
    }

    /// True when the error originated in a unit of work rather than in
    /// the transaction machinery. Lets callers tell "action failed" apart
    /// from "action succeeded, commit failed".
    pub fn is_app(&self) -> bool {
        matches!(self, Self::App(_))
    }
}
