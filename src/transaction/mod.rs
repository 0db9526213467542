//! Nested transactions over flat-transaction connections.
//!
//! A [`TransactionScope`] binds each adapter it touches to one
//! [`TransactionPrimitive`] through a [`TransactionRegistry`]. The
//! [`Dispatcher`] injected into the scope decides the primitive: a root
//! `BEGIN`/`COMMIT`/`ROLLBACK` when the adapter has no open scope, a
//! savepoint when it does.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TransactionScope                         │
//! │      (links adapters, drives begin/commit/rollback)         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │  TransactionRegistry  │  one primitive per adapter
//!                  └───────────────────────┘
//!                              │
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │      Dispatcher       │  root or savepoint?
//!                  └───────────────────────┘
//!                     │                 │
//!                     ▼                 ▼
//!               ┌──────────┐     ┌─────────────┐
//!               │   Root   │     │  Savepoint  │◄── IdGenerator
//!               └──────────┘     └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use savepoint_tx::adapter::{Adapter, MemoryAdapter};
//! use savepoint_tx::transaction::{with_transaction, Dispatcher, NestingDispatcher, TransactionError};
//!
//! let dispatcher: Arc<dyn Dispatcher> = Arc::new(NestingDispatcher::new());
//! let memory = Arc::new(MemoryAdapter::new("default", "PostgresAdapter"));
//! let connection = Arc::clone(memory.connection());
//! let adapters: [Arc<dyn Adapter>; 1] = [memory];
//!
//! with_transaction(&dispatcher, &adapters, || {
//!     // Runs inside SAVEPOINT "<id>" on the same connection.
//!     with_transaction(&dispatcher, &adapters, || Ok::<_, TransactionError>(()))
//! })
//! .unwrap();
//!
//! assert_eq!(connection.statements().len(), 4);
//! ```

mod dispatch;
mod error;
mod primitive;
mod registry;
mod scope;

pub use dispatch::{dispatcher_for, Dispatcher, FlatDispatcher, NestingDispatcher};
pub use error::{TransactionError, TransactionResult};
pub use primitive::{PrimitiveKind, PrimitiveState, Savepoint, TransactionPrimitive};
pub use registry::TransactionRegistry;
pub use scope::{with_transaction, ScopeId, ScopeState, TransactionScope};
