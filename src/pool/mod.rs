//! Collaborator traits for the connection pool boundary.
//!
//! The transaction core never opens sockets or speaks a wire protocol.
//! It reaches the database through two narrow traits: [`ConnectionSource`],
//! which hands out connections, and [`Connection`], which exposes the
//! handful of operations the core needs (auto-commit control, read-only
//! mode, commit/rollback/close) plus an opaque execute capability for
//! caller-supplied units of work.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::executor::StatementError;

#[cfg(test)]
pub(crate) mod mock;

/// A single result row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// Errors raised while acquiring a connection from the source.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The pool has no free connections and cannot grow.
    #[error("connection pool exhausted")]
    Exhausted,

    /// The source cannot produce connections at all.
    #[error("connection source unavailable: {0}")]
    Unavailable(String),
}

/// A single physical database connection.
///
/// Implementations wrap whatever the pool hands out. The core calls the
/// auto-commit and read-only setters during transaction setup and teardown;
/// `execute`/`query` are passed through untouched to units of work.
pub trait Connection: Send {
    /// Current auto-commit setting as delivered by the pool.
    fn auto_commit(&self) -> Result<bool, StatementError>;

    /// Enable or disable auto-commit on this connection.
    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), StatementError>;

    /// Put the connection into (or out of) read-only mode.
    fn set_read_only(&mut self, read_only: bool) -> Result<(), StatementError>;

    /// Run a statement, returning the number of affected rows.
    fn execute(&mut self, statement: &str, params: &[Value]) -> Result<u64, StatementError>;

    /// Run a query, returning its result rows.
    fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StatementError>;

    /// Commit the connection's pending work.
    fn commit(&mut self) -> Result<(), StatementError>;

    /// Roll back the connection's pending work.
    fn rollback(&mut self) -> Result<(), StatementError>;

    /// Release the connection back to its pool.
    fn close(&mut self) -> Result<(), StatementError>;
}

/// Source of connections, typically backed by a pool.
pub trait ConnectionSource: Send + Sync {
    /// Acquire a connection. Blocking and timeouts are the source's
    /// concern; they surface here as [`AcquireError`].
    fn acquire(&self) -> Result<Box<dyn Connection>, AcquireError>;
}
