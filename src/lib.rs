//! savepoint-tx - nested transactions for flat-transaction connections
//!
//! Many SQL connections support a single level of `BEGIN`/`COMMIT`. This
//! crate lets a unit of work open a transaction while already inside one:
//! the outermost scope on a connection issues a real transaction, and every
//! scope opened inside it becomes a `SAVEPOINT` that is released on success
//! or rolled back to on failure, leaving the enclosing work intact.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use savepoint_tx::adapter::{Adapter, MemoryAdapter};
//! use savepoint_tx::transaction::{Dispatcher, NestingDispatcher, TransactionScope};
//!
//! let dispatcher: Arc<dyn Dispatcher> = Arc::new(NestingDispatcher::new());
//! let adapter: Arc<dyn Adapter> = Arc::new(MemoryAdapter::new("default", "PostgresAdapter"));
//!
//! let mut outer = TransactionScope::new(Arc::clone(&dispatcher));
//! outer.link(&adapter).unwrap();
//! outer.begin().unwrap();                       // BEGIN
//!
//! outer.within(|| {
//!     let mut inner = TransactionScope::new(Arc::clone(&dispatcher));
//!     inner.link(&adapter).unwrap();
//!     inner.begin().unwrap();                   // SAVEPOINT "<id>"
//!     inner.rollback().unwrap();                // ROLLBACK TO SAVEPOINT "<id>"
//! }).unwrap();
//!
//! outer.commit().unwrap();                      // COMMIT
//! ```

pub mod adapter;
pub mod config;
pub mod savepoint;
pub mod transaction;

pub use config::NestingConfig;
