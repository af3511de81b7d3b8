//! Per-execution-context transaction stacks.
//!
//! A [`TransactionContext`] pairs a transaction's dedicated executor with
//! the auto-commit flag to restore when it completes. Contexts live on a
//! LIFO stack scoped to one logical execution context; the stack is what
//! makes join-vs-create decisions possible. [`ConnectionContext`] is the
//! stack contract, [`ThreadLocalContext`] the default thread-scoped
//! implementation. Alternate scoping strategies (task-local, explicit
//! handle) are valid as long as they keep concurrent contexts isolated
//! and preserve LIFO order.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ulid::Ulid;

use crate::executor::StatementExecutor;
use crate::transaction::error::{TransactionError, TransactionResult};

/// One open transaction: its dedicated executor plus the connection state
/// to restore on completion.
///
/// Immutable after construction. Clones are cheap handles onto the same
/// executor; the stack entry stays authoritative for finalization.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    id: String,
    started_at: DateTime<Utc>,
    auto_commit_restore: bool,
    executor: StatementExecutor,
}

impl TransactionContext {
    /// Create a context for a newly begun transaction.
    pub fn new(auto_commit_restore: bool, executor: StatementExecutor) -> Self {
        Self {
            id: Ulid::new().to_string().to_lowercase(),
            started_at: Utc::now(),
            auto_commit_restore,
            executor,
        }
    }

    /// Unique transaction ID, for logging and diagnostics.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the transaction began.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Auto-commit value the connection carried before the transaction
    /// disabled it.
    pub fn auto_commit_restore(&self) -> bool {
        self.auto_commit_restore
    }

    /// The executor bound to this transaction's connection.
    pub fn executor(&self) -> &StatementExecutor {
        &self.executor
    }
}

/// LIFO stack of open transactions for the current execution context.
///
/// Implementations must isolate concurrent execution contexts from each
/// other: a thread (or task) never observes another's stack.
pub trait ConnectionContext: Send + Sync {
    /// Store `tx` as the new top of the current context's stack.
    fn push(&self, tx: TransactionContext);

    /// Remove and return the current top.
    ///
    /// Fails with [`TransactionError::EmptyStack`] when nothing is open.
    fn pop(&self) -> TransactionResult<TransactionContext>;

    /// The current top without removing it, `None` when the stack is empty.
    fn current(&self) -> Option<TransactionContext>;
}

/// Default [`ConnectionContext`]: one stack per OS thread.
///
/// Stacks are keyed by [`ThreadId`] in a single map rather than a
/// `thread_local!` static so the store belongs to the manager that owns
/// it, not to the process. A thread's entry is removed as soon as its
/// stack empties.
#[derive(Default)]
pub struct ThreadLocalContext {
    stacks: Mutex<HashMap<ThreadId, Vec<TransactionContext>>>,
}

impl ThreadLocalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth of the calling thread's stack. Zero after every completed
    /// top-level unit of work; anything else is a leak.
    pub fn depth(&self) -> usize {
        self.stacks
            .lock()
            .get(&thread::current().id())
            .map_or(0, Vec::len)
    }
}

impl ConnectionContext for ThreadLocalContext {
    fn push(&self, tx: TransactionContext) {
        self.stacks
            .lock()
            .entry(thread::current().id())
            .or_default()
            .push(tx);
    }

    fn pop(&self) -> TransactionResult<TransactionContext> {
        let mut stacks = self.stacks.lock();
        let thread_id = thread::current().id();
        let stack = stacks.get_mut(&thread_id).ok_or(TransactionError::EmptyStack)?;
        let tx = stack.pop().ok_or(TransactionError::EmptyStack)?;
        if stack.is_empty() {
            stacks.remove(&thread_id);
        }
        Ok(tx)
    }

    fn current(&self) -> Option<TransactionContext> {
        self.stacks
            .lock()
            .get(&thread::current().id())
            .and_then(|stack| stack.last().cloned())
    }
}
