//! Connection-provider interfaces.
//!
//! The core never talks to a database driver directly. It sees an
//! [`Adapter`] that owns a [`Connection`] and knows whether a transaction
//! scope is currently open on it. Drivers implement these traits;
//! [`MemoryAdapter`] is an in-process implementation that records and
//! validates every statement.

mod error;
mod memory;

use std::sync::Arc;

pub use error::{ConnectionError, ConnectionResult};
pub use memory::{MemoryAdapter, MemoryConnection};

use crate::transaction::ScopeId;

/// A live connection able to execute statements.
///
/// Implementations are shared between a root primitive and every
/// savepoint nested under it, so execution takes `&self`.
pub trait Connection: Send + Sync {
    /// Execute a statement that returns no rows.
    fn execute(&self, sql: &str) -> ConnectionResult<()>;
}

impl dyn Connection {
    /// Prepare a statement for execution on this connection.
    pub fn create_command(&self, sql: impl Into<String>) -> Command<'_> {
        Command {
            connection: self,
            sql: sql.into(),
        }
    }
}

/// A statement bound to a connection.
pub struct Command<'c> {
    connection: &'c dyn Connection,
    sql: String,
}

impl Command<'_> {
    /// The statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Run the statement.
    pub fn execute_non_query(self) -> ConnectionResult<()> {
        self.connection.execute(&self.sql)
    }
}

/// Owner of a connection that tracks open transaction scopes.
pub trait Adapter: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Backend family name, consulted only for the savepoint commit rule.
    fn adapter_kind(&self) -> &str;

    /// The connection new primitives bind to.
    fn current_connection(&self) -> Arc<dyn Connection>;

    /// The innermost open scope, if any. Must be accurate at call time.
    fn current_transaction(&self) -> Option<ScopeId>;

    /// Mark a scope as open on this adapter.
    fn push_transaction(&self, scope: ScopeId);

    /// Remove the innermost open scope.
    fn pop_transaction(&self) -> Option<ScopeId>;
}

/// Identity of an adapter instance, used to key registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterKey(usize);

impl AdapterKey {
    /// Key for an adapter, by allocation.
    pub fn of(adapter: &Arc<dyn Adapter>) -> Self {
        Self(Arc::as_ptr(adapter) as *const () as usize)
    }
}
