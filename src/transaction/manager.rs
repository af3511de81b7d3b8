//! Transaction manager - orchestrates transaction lifecycle.
//!
//! The TransactionManager is the main entry point. It handles:
//! - join-vs-create decisions against the connection context stack
//! - commit/rollback/cleanup under error propagation
//! - routing read-only work to the right executor
//!
//! Joining means nested units of work share one physical transaction and
//! one commit/rollback outcome; only the call that created a transaction
//! finalizes it.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::executor::StatementExecutor;
use crate::pool::ConnectionSource;
use crate::transaction::context::{ConnectionContext, ThreadLocalContext, TransactionContext};
use crate::transaction::error::TransactionResult;

/// Transaction manager sitting above a connection source.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc
/// internally); each thread gets its own transaction stack from the
/// connection context.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    /// Where new transaction connections come from.
    source: Arc<dyn ConnectionSource>,
    /// Per-execution-context transaction stacks.
    context: Arc<dyn ConnectionContext>,
    /// Long-lived executor for work outside any transaction.
    sql: StatementExecutor,
    /// Long-lived executor for read-only work outside any transaction.
    read_sql: StatementExecutor,
}

impl TransactionManager {
    /// Create a manager with an explicit connection context implementation.
    pub fn new(source: Arc<dyn ConnectionSource>, context: Arc<dyn ConnectionContext>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                sql: StatementExecutor::ambient(Arc::clone(&source)),
                read_sql: StatementExecutor::ambient_read_only(Arc::clone(&source)),
                source,
                context,
            }),
        }
    }

    /// Create a manager with the default thread-scoped connection context.
    pub fn thread_local(source: Arc<dyn ConnectionSource>) -> Self {
        Self::new(source, Arc::new(ThreadLocalContext::new()))
    }

    /// Begin a transaction unless one is already current.
    ///
    /// Returns `true` when this call created the transaction, `false` when
    /// the caller is joining an existing one (no side effects in that case).
    pub fn transaction(&self) -> TransactionResult<bool> {
        if self.inner.context.current().is_none() {
            self.begin()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Run `action` inside the current transaction, starting one if needed.
    ///
    /// Join-aware: nested calls share one physical transaction, and only
    /// the outermost call commits or rolls back. The action raises any
    /// error type via [`TransactionError::app`]; it propagates unchanged
    /// after a best-effort rollback.
    ///
    /// [`TransactionError::app`]: crate::transaction::TransactionError::app
    pub fn in_transaction<T, F>(&self, action: F) -> TransactionResult<T>
    where
        F: FnOnce() -> TransactionResult<T>,
    {
        let created = self.transaction()?;
        self.run_scoped(action, created)
    }

    /// Run `action` in a brand-new transaction, even when one is already
    /// current.
    ///
    /// Always finalizes its own transaction, independent of any outer one.
    /// The outer transaction's connection and pending state are untouched:
    /// the new transaction runs on a second pooled connection, so the two
    /// commit or roll back separately.
    pub fn in_new_transaction<T, F>(&self, action: F) -> TransactionResult<T>
    where
        F: FnOnce() -> TransactionResult<T>,
    {
        self.begin()?;
        self.run_scoped(action, true)
    }

    /// Run a read-only `action` against the right executor.
    ///
    /// Inside a transaction, the action receives that transaction's
    /// executor so reads observe its in-flight writes. Outside, it
    /// receives the dedicated read-only executor.
    pub fn with_read<T, F>(&self, action: F) -> TransactionResult<T>
    where
        F: FnOnce(&StatementExecutor) -> TransactionResult<T>,
    {
        match self.inner.context.current() {
            Some(tx) => action(tx.executor()),
            None => action(&self.inner.read_sql),
        }
    }

    /// The executor for the current transaction, or the ambient executor
    /// when no transaction is open. No side effects.
    pub fn sql(&self) -> StatementExecutor {
        match self.inner.context.current() {
            Some(tx) => tx.executor().clone(),
            None => self.inner.sql.clone(),
        }
    }

    /// The ambient read-only executor.
    pub fn read_sql(&self) -> StatementExecutor {
        self.inner.read_sql.clone()
    }

    /// Release the ambient executors.
    ///
    /// Per-transaction executors are not touched; any still open at this
    /// point is a caller error.
    pub fn close(&self) -> TransactionResult<()> {
        let sql_result = self.inner.sql.close();
        let read_result = self.inner.read_sql.close();
        sql_result?;
        read_result?;
        Ok(())
    }

    /// Acquire a fresh connection, disable auto-commit and push the new
    /// transaction onto the context stack.
    fn begin(&self) -> TransactionResult<()> {
        let mut conn = self.inner.source.acquire()?;
        let auto_commit = match conn.auto_commit() {
            Ok(value) => value,
            Err(err) => {
                let _ = conn.close();
                return Err(err.into());
            }
        };
        if let Err(err) = conn.set_auto_commit(false) {
            let _ = conn.close();
            return Err(err.into());
        }
        let tx = TransactionContext::new(auto_commit, StatementExecutor::bound(conn));
        debug!(tx_id = tx.id(), "transaction started");
        self.inner.context.push(tx);
        Ok(())
    }

    /// Execution and finalization policy shared by `in_transaction` and
    /// `in_new_transaction`.
    ///
    /// On action error: best-effort rollback on the current transaction
    /// (a rollback failure is logged and suppressed so it never masks the
    /// action's error), then, when this call owns the transaction, pop and
    /// close without committing. On success with ownership: pop, commit,
    /// close; a commit failure is logged and becomes the call's error, and
    /// the connection is released either way.
    fn run_scoped<T, F>(&self, action: F, owns_transaction: bool) -> TransactionResult<T>
    where
        F: FnOnce() -> TransactionResult<T>,
    {
        match action() {
            Ok(value) => {
                if owns_transaction {
                    self.complete_current()?;
                }
                Ok(value)
            }
            Err(err) => {
                if let Some(tx) = self.inner.context.current() {
                    if let Err(rollback_err) = tx.executor().rollback() {
                        warn!(
                            tx_id = tx.id(),
                            error = %rollback_err,
                            "rollback failed after action error; suppressed"
                        );
                    }
                }
                if owns_transaction {
                    self.discard_current();
                }
                Err(err)
            }
        }
    }

    /// Finalize the current transaction on the success path.
    fn complete_current(&self) -> TransactionResult<()> {
        let tx = self.inner.context.pop()?;
        let executor = tx.executor();
        let commit_result = executor.commit();
        if let Err(err) = &commit_result {
            warn!(tx_id = tx.id(), error = %err, "commit failed");
        }
        self.restore_auto_commit(&tx);
        let close_result = executor.close();
        commit_result?;
        close_result?;
        debug!(tx_id = tx.id(), "transaction committed");
        Ok(())
    }

    /// Finalize the current transaction on the error path: the rollback
    /// already happened, so the connection is restored and released
    /// without any commit attempt. Failures here are logged, never raised,
    /// so the action's error stays the one the caller sees.
    fn discard_current(&self) {
        match self.inner.context.pop() {
            Ok(tx) => {
                self.restore_auto_commit(&tx);
                if let Err(err) = tx.executor().close() {
                    warn!(tx_id = tx.id(), error = %err, "close failed while discarding transaction");
                }
                debug!(tx_id = tx.id(), "transaction rolled back");
            }
            Err(_) => {
                // Stack underflow here means the bookkeeping is broken.
                error!("transaction stack empty during finalize; connection may leak");
            }
        }
    }

    /// Put the connection's auto-commit flag back the way the pool
    /// delivered it, best-effort.
    fn restore_auto_commit(&self, tx: &TransactionContext) {
        if let Err(err) = tx.executor().set_auto_commit(tx.auto_commit_restore()) {
            debug!(tx_id = tx.id(), error = %err, "could not restore auto-commit");
        }
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("in_transaction", &self.inner.context.current().is_some())
            .finish()
    }
}
