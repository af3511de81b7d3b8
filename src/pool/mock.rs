//! Scripted mock connection source for unit tests.
//!
//! Every call on every connection is appended to a shared event log so
//! tests can assert on the exact sequence of pool interactions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{AcquireError, Connection, ConnectionSource, Row};
use crate::executor::StatementError;

/// Which operations the scripted connections should fail.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FailurePlan {
    pub commit: bool,
    pub rollback: bool,
    pub execute: bool,
}

pub(crate) struct MockSource {
    log: Arc<Mutex<Vec<String>>>,
    next_id: AtomicUsize,
    plan: FailurePlan,
    fail_acquire: bool,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Self::with_plan(FailurePlan::default())
    }

    pub fn with_plan(plan: FailurePlan) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicUsize::new(1),
            plan,
            fail_acquire: false,
        })
    }

    pub fn failing_acquire() -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicUsize::new(1),
            plan: FailurePlan::default(),
            fail_acquire: true,
        })
    }

    /// Snapshot of the event log so far.
    pub fn events(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Count of events matching a suffix, e.g. `.commit`.
    pub fn count(&self, suffix: &str) -> usize {
        self.log.lock().iter().filter(|e| e.ends_with(suffix)).count()
    }
}

impl ConnectionSource for MockSource {
    fn acquire(&self) -> Result<Box<dyn Connection>, AcquireError> {
        if self.fail_acquire {
            return Err(AcquireError::Exhausted);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(format!("acquire conn{id}"));
        Ok(Box::new(MockConnection {
            id,
            log: Arc::clone(&self.log),
            auto_commit: true,
            plan: self.plan,
        }))
    }
}

struct MockConnection {
    id: usize,
    log: Arc<Mutex<Vec<String>>>,
    auto_commit: bool,
    plan: FailurePlan,
}

impl MockConnection {
    fn record(&self, event: &str) {
        self.log.lock().push(format!("conn{}.{event}", self.id));
    }
}

impl Connection for MockConnection {
    fn auto_commit(&self) -> Result<bool, StatementError> {
        Ok(self.auto_commit)
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), StatementError> {
        self.record(&format!("set_auto_commit({enabled})"));
        self.auto_commit = enabled;
        Ok(())
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<(), StatementError> {
        self.record(&format!("set_read_only({read_only})"));
        Ok(())
    }

    fn execute(&mut self, statement: &str, _params: &[Value]) -> Result<u64, StatementError> {
        self.record(&format!("execute({statement})"));
        if self.plan.execute {
            return Err(StatementError::Execute("scripted failure".into()));
        }
        Ok(1)
    }

    fn query(&mut self, statement: &str, _params: &[Value]) -> Result<Vec<Row>, StatementError> {
        self.record(&format!("query({statement})"));
        if self.plan.execute {
            return Err(StatementError::Execute("scripted failure".into()));
        }
        Ok(Vec::new())
    }

    fn commit(&mut self) -> Result<(), StatementError> {
        self.record("commit");
        if self.plan.commit {
            return Err(StatementError::Commit("scripted failure".into()));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StatementError> {
        self.record("rollback");
        if self.plan.rollback {
            return Err(StatementError::Rollback("scripted failure".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StatementError> {
        self.record("close");
        Ok(())
    }
}
