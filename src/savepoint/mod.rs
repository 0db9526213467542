//! Savepoint naming and SQL dialect rules.
//!
//! Every nested transaction level is a named savepoint on the connection
//! that already carries the root transaction. The names come from
//! [`IdGenerator`]; the statements and the per-backend commit rule come
//! from [`dialect`].

pub mod dialect;
mod id;

pub use dialect::SavepointCommit;
pub use id::{next_id, resolve_host, IdGenerator, SavepointId, MAX_ID_LENGTH};
