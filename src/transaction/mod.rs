//! Transaction management for txstack.
//!
//! Units of work run through the [`TransactionManager`], which consults a
//! per-execution-context stack of open transactions to decide whether a
//! call joins the current transaction or starts its own.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │   (join-vs-create, commit/rollback/cleanup, read routing)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Connection  │       │ Transaction │       │ Statement   │
//!  │  Context    │       │  Context    │       │  Executor   │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txstack::TransactionManager;
//!
//! let manager = TransactionManager::thread_local(pool);
//!
//! manager.in_transaction(|| {
//!     let sql = manager.sql();
//!     sql.execute("INSERT INTO users (name) VALUES (?)", &[name])?;
//!     // Nested calls join this transaction; one commit at the end.
//!     Ok(())
//! })?;
//! ```

mod context;
mod error;
mod manager;

pub use context::{ConnectionContext, ThreadLocalContext, TransactionContext};
pub use error::{TransactionError, TransactionResult};
pub use manager::TransactionManager;
