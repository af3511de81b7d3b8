//! txstack - thread-scoped transaction management over a SQL pool
//!
//! This crate sits between application code and a relational connection
//! pool. A unit of work either joins the transaction already open on its
//! thread or starts a new one; read-only work reuses an open transaction's
//! connection or falls back to a dedicated read-only path. SQL building,
//! pool implementation and datasource configuration stay outside, behind
//! the narrow traits in [`pool`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use txstack::{ConnectionSource, TransactionManager};
//!
//! fn run(pool: Arc<dyn ConnectionSource>) -> txstack::TransactionResult<()> {
//!     let manager = TransactionManager::thread_local(pool);
//!     manager.in_transaction(|| {
//!         manager.sql().execute("UPDATE accounts SET ...", &[])?;
//!         Ok(())
//!     })
//! }
//! ```

pub mod executor;
pub mod pool;
pub mod transaction;

pub use executor::{StatementError, StatementExecutor};
pub use pool::{AcquireError, Connection, ConnectionSource, Row};
pub use transaction::{
    ConnectionContext, ThreadLocalContext, TransactionContext, TransactionError,
    TransactionManager, TransactionResult,
};
