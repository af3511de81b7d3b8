//! Statement execution handles.
//!
//! A [`StatementExecutor`] is the object units of work run their SQL
//! against. It comes in three flavors:
//!
//! - *bound*: owns a dedicated connection for the lifetime of one
//!   transaction (auto-commit disabled by the manager),
//! - *ambient*: holds no connection, acquires one from the source per
//!   statement and releases it afterwards,
//! - *ambient read-only*: same, but forces every newly acquired connection
//!   into read-only mode before first use.
//!
//! Executors are cheap clone-able handles (`Arc` internally) so the same
//! transaction-bound executor can sit on the context stack and be handed
//! to units of work at the same time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::pool::{AcquireError, Connection, ConnectionSource, Row};

/// Errors raised while executing, committing, rolling back or closing.
#[derive(Debug, Error)]
pub enum StatementError {
    /// A statement failed to execute.
    #[error("statement failed: {0}")]
    Execute(String),

    /// The connection refused to commit.
    #[error("commit failed: {0}")]
    Commit(String),

    /// The connection refused to roll back.
    #[error("rollback failed: {0}")]
    Rollback(String),

    /// The connection could not be released.
    #[error("close failed: {0}")]
    Close(String),

    /// The executor was used after `close`.
    #[error("executor is closed")]
    Closed,

    /// An ambient executor could not acquire a connection for a statement.
    #[error("connection acquisition failed: {0}")]
    Acquire(#[from] AcquireError),
}

struct BoundState {
    /// The dedicated connection, `None` once closed.
    conn: Option<Box<dyn Connection>>,
    /// Set by a successful rollback, cleared by the next statement.
    /// Lets join-chain error propagation roll the same work back once.
    rolled_back: bool,
}

enum Binding {
    /// Dedicated connection, owned until `close`.
    Bound(Mutex<BoundState>),
    /// Connection-per-statement against the source.
    Ambient {
        source: Arc<dyn ConnectionSource>,
        read_only: bool,
        closed: AtomicBool,
    },
}

/// Handle for running SQL, scoped either to one transaction's connection
/// or to the pool at large.
#[derive(Clone)]
pub struct StatementExecutor {
    binding: Arc<Binding>,
}

impl StatementExecutor {
    /// Executor bound to a dedicated connection.
    pub fn bound(conn: Box<dyn Connection>) -> Self {
        Self {
            binding: Arc::new(Binding::Bound(Mutex::new(BoundState {
                conn: Some(conn),
                rolled_back: false,
            }))),
        }
    }

    /// Ambient executor: acquires a fresh connection per statement.
    pub fn ambient(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            binding: Arc::new(Binding::Ambient {
                source,
                read_only: false,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Ambient executor that puts every acquired connection into
    /// read-only mode before use.
    pub fn ambient_read_only(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            binding: Arc::new(Binding::Ambient {
                source,
                read_only: true,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Whether this executor holds a dedicated transaction connection.
    pub fn is_bound(&self) -> bool {
        matches!(*self.binding, Binding::Bound(_))
    }

    /// Run a statement, returning the number of affected rows.
    pub fn execute(&self, statement: &str, params: &[Value]) -> Result<u64, StatementError> {
        self.with_connection(|conn| conn.execute(statement, params))
    }

    /// Run a query, returning its result rows.
    pub fn query(&self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StatementError> {
        self.with_connection(|conn| conn.query(statement, params))
    }

    /// Commit pending work on the bound connection.
    ///
    /// On an ambient executor this is a logged no-op: there is no held
    /// connection, each statement already ran in its own.
    pub fn commit(&self) -> Result<(), StatementError> {
        match &*self.binding {
            Binding::Bound(state) => {
                let mut state = state.lock();
                state.conn.as_mut().ok_or(StatementError::Closed)?.commit()
            }
            Binding::Ambient { .. } => {
                debug!("commit ignored on ambient executor");
                Ok(())
            }
        }
    }

    /// Roll back pending work on the bound connection.
    ///
    /// Rolling back again with no statements in between is a logged no-op:
    /// when an error propagates through a chain of joined scopes, each
    /// scope attempts a rollback but only one reaches the connection.
    /// Logged no-op on ambient executors, as with [`commit`](Self::commit).
    pub fn rollback(&self) -> Result<(), StatementError> {
        match &*self.binding {
            Binding::Bound(state) => {
                let mut state = state.lock();
                if state.rolled_back {
                    debug!("rollback skipped; connection already rolled back");
                    return Ok(());
                }
                state.conn.as_mut().ok_or(StatementError::Closed)?.rollback()?;
                state.rolled_back = true;
                Ok(())
            }
            Binding::Ambient { .. } => {
                debug!("rollback ignored on ambient executor");
                Ok(())
            }
        }
    }

    /// Release the executor.
    ///
    /// A bound executor releases its dedicated connection; closing twice is
    /// a no-op. An ambient executor stops acquiring: further statements
    /// fail with [`StatementError::Closed`].
    pub fn close(&self) -> Result<(), StatementError> {
        match &*self.binding {
            Binding::Bound(state) => match state.lock().conn.take() {
                Some(mut conn) => conn.close(),
                None => Ok(()),
            },
            Binding::Ambient { closed, .. } => {
                closed.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    /// Restore the auto-commit flag on the bound connection.
    ///
    /// Called by the manager during finalize, before the connection goes
    /// back to the pool. No-op on ambient executors.
    pub(crate) fn set_auto_commit(&self, enabled: bool) -> Result<(), StatementError> {
        match &*self.binding {
            Binding::Bound(state) => {
                let mut state = state.lock();
                state
                    .conn
                    .as_mut()
                    .ok_or(StatementError::Closed)?
                    .set_auto_commit(enabled)
            }
            Binding::Ambient { .. } => Ok(()),
        }
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> Result<T, StatementError>,
    ) -> Result<T, StatementError> {
        match &*self.binding {
            Binding::Bound(state) => {
                let mut state = state.lock();
                let conn = state.conn.as_mut().ok_or(StatementError::Closed)?;
                let result = f(conn.as_mut());
                // Even a failed statement may leave work worth rolling back.
                state.rolled_back = false;
                result
            }
            Binding::Ambient {
                source,
                read_only,
                closed,
            } => {
                if closed.load(Ordering::SeqCst) {
                    return Err(StatementError::Closed);
                }
                let mut conn = source.acquire()?;
                if *read_only {
                    conn.set_read_only(true)?;
                }
                let result = f(conn.as_mut());
                // Release even when the statement failed.
                let close_result = conn.close();
                let value = result?;
                close_result?;
                Ok(value)
            }
        }
    }
}

impl std::fmt::Debug for StatementExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flavor = match &*self.binding {
            Binding::Bound(_) => "bound",
            Binding::Ambient {
                read_only: true, ..
            } => "ambient-read-only",
            Binding::Ambient { .. } => "ambient",
        };
        f.debug_struct("StatementExecutor")
            .field("flavor", &flavor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::mock::{FailurePlan, MockSource};

    #[test]
    fn test_bound_executes_on_dedicated_connection() {
        let source = MockSource::new();
        let conn = source.acquire().unwrap();
        let exec = StatementExecutor::bound(conn);

        exec.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        exec.execute("INSERT INTO t VALUES (2)", &[]).unwrap();
        exec.commit().unwrap();
        exec.close().unwrap();

        // One acquisition total, both statements on it.
        assert_eq!(
            source.events(),
            vec![
                "acquire conn1",
                "conn1.execute(INSERT INTO t VALUES (1))",
                "conn1.execute(INSERT INTO t VALUES (2))",
                "conn1.commit",
                "conn1.close",
            ]
        );
    }

    #[test]
    fn test_bound_close_is_idempotent() {
        let source = MockSource::new();
        let exec = StatementExecutor::bound(source.acquire().unwrap());

        exec.close().unwrap();
        exec.close().unwrap();
        assert_eq!(source.count(".close"), 1);

        let err = exec.execute("SELECT 1", &[]).unwrap_err();
        assert!(matches!(err, StatementError::Closed));
    }

    #[test]
    fn test_ambient_acquires_per_statement() {
        let source = MockSource::new();
        let exec = StatementExecutor::ambient(Arc::clone(&source) as Arc<dyn ConnectionSource>);

        exec.execute("DELETE FROM t", &[]).unwrap();
        exec.query("SELECT * FROM t", &[]).unwrap();

        assert_eq!(
            source.events(),
            vec![
                "acquire conn1",
                "conn1.execute(DELETE FROM t)",
                "conn1.close",
                "acquire conn2",
                "conn2.query(SELECT * FROM t)",
                "conn2.close",
            ]
        );
    }

    #[test]
    fn test_ambient_releases_connection_on_statement_failure() {
        let source = MockSource::with_plan(FailurePlan {
            execute: true,
            ..Default::default()
        });
        let exec = StatementExecutor::ambient(Arc::clone(&source) as Arc<dyn ConnectionSource>);

        let err = exec.execute("BROKEN", &[]).unwrap_err();
        assert!(matches!(err, StatementError::Execute(_)));
        assert_eq!(source.count(".close"), 1);
    }

    #[test]
    fn test_read_only_set_on_every_acquired_connection() {
        let source = MockSource::new();
        let exec =
            StatementExecutor::ambient_read_only(Arc::clone(&source) as Arc<dyn ConnectionSource>);

        exec.query("SELECT 1", &[]).unwrap();
        exec.query("SELECT 2", &[]).unwrap();

        assert_eq!(source.count(".set_read_only(true)"), 2);
    }

    #[test]
    fn test_repeated_rollback_reaches_connection_once() {
        let source = MockSource::new();
        let exec = StatementExecutor::bound(source.acquire().unwrap());

        exec.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        exec.rollback().unwrap();
        exec.rollback().unwrap();
        assert_eq!(source.count(".rollback"), 1);

        // A new statement re-arms the rollback.
        exec.execute("INSERT INTO t VALUES (2)", &[]).unwrap();
        exec.rollback().unwrap();
        assert_eq!(source.count(".rollback"), 2);
    }

    #[test]
    fn test_ambient_commit_and_rollback_are_noops() {
        let source = MockSource::new();
        let exec = StatementExecutor::ambient(Arc::clone(&source) as Arc<dyn ConnectionSource>);

        exec.commit().unwrap();
        exec.rollback().unwrap();
        assert!(source.events().is_empty());
    }

    #[test]
    fn test_ambient_closed_refuses_statements() {
        let source = MockSource::new();
        let exec = StatementExecutor::ambient(Arc::clone(&source) as Arc<dyn ConnectionSource>);

        exec.close().unwrap();
        let err = exec.query("SELECT 1", &[]).unwrap_err();
        assert!(matches!(err, StatementError::Closed));
        assert!(source.events().is_empty());
    }

    #[test]
    fn test_ambient_surfaces_acquire_failure() {
        let source = MockSource::failing_acquire();
        let exec = StatementExecutor::ambient(Arc::clone(&source) as Arc<dyn ConnectionSource>);

        let err = exec.execute("SELECT 1", &[]).unwrap_err();
        assert!(matches!(err, StatementError::Acquire(_)));
    }
}
