//! Transaction primitives.
//!
//! A primitive is the begin/commit/rollback/close capability for one
//! nesting level on one connection. The root variant issues real
//! `BEGIN`/`COMMIT`/`ROLLBACK`; the savepoint variant issues
//! `SAVEPOINT`/`RELEASE SAVEPOINT`/`ROLLBACK TO SAVEPOINT` on a connection
//! whose root transaction is already open.
//!
//! Both variants share one lifecycle:
//!
//! ```text
//! Pending --begin--> Active --commit--> Committed --close--> Closed
//!    |                  \---rollback--> RolledBack --close--> Closed
//!    \--------------------------------------------------close--> Closed
//! ```
//!
//! A statement the backend rejects leaves the state where it was.

use std::fmt;
use std::sync::Arc;

use crate::adapter::Connection;
use crate::savepoint::dialect::{self, SavepointCommit};
use crate::savepoint::SavepointId;
use crate::transaction::error::{TransactionError, TransactionResult};

/// Lifecycle position of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveState {
    /// Created, not yet begun.
    Pending,
    /// Begun; awaiting commit or rollback.
    Active,
    /// Committed; awaiting close.
    Committed,
    /// Rolled back; awaiting close.
    RolledBack,
    /// Finished.
    Closed,
}

impl fmt::Display for PrimitiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrimitiveState::Pending => "pending",
            PrimitiveState::Active => "active",
            PrimitiveState::Committed => "committed",
            PrimitiveState::RolledBack => "rolled back",
            PrimitiveState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Savepoint attributes of a nested primitive.
#[derive(Debug, Clone)]
pub struct Savepoint {
    id: SavepointId,
    adapter_kind: String,
    commit: SavepointCommit,
}

impl Savepoint {
    /// Get the savepoint name.
    pub fn id(&self) -> &SavepointId {
        &self.id
    }

    /// Get the adapter kind the primitive was created for.
    pub fn adapter_kind(&self) -> &str {
        &self.adapter_kind
    }

    /// Get the commit behaviour.
    pub fn commit_style(&self) -> SavepointCommit {
        self.commit
    }
}

/// Which strategy a primitive uses.
#[derive(Debug, Clone)]
pub enum PrimitiveKind {
    /// Flat transaction: owns the connection's transactional state.
    Root,
    /// Nested transaction inside an already open root transaction.
    Savepoint(Savepoint),
}

/// A begin/commit/rollback/close capability bound to one connection.
pub struct TransactionPrimitive {
    kind: PrimitiveKind,
    connection: Arc<dyn Connection>,
    state: PrimitiveState,
}

impl TransactionPrimitive {
    /// A root primitive that will open the connection's first transaction.
    pub fn root(connection: Arc<dyn Connection>) -> Self {
        Self {
            kind: PrimitiveKind::Root,
            connection,
            state: PrimitiveState::Pending,
        }
    }

    /// A savepoint primitive.
    ///
    /// `connection` must already carry an open root transaction; the
    /// dispatcher guarantees this. `adapter_kind` is kept for diagnostics,
    /// `commit` is the commit rule derived from it.
    pub fn savepoint(
        connection: Arc<dyn Connection>,
        id: SavepointId,
        adapter_kind: impl Into<String>,
        commit: SavepointCommit,
    ) -> Self {
        Self {
            kind: PrimitiveKind::Savepoint(Savepoint {
                id,
                adapter_kind: adapter_kind.into(),
                commit,
            }),
            connection,
            state: PrimitiveState::Pending,
        }
    }

    /// Get the primitive strategy.
    pub fn kind(&self) -> &PrimitiveKind {
        &self.kind
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> PrimitiveState {
        self.state
    }

    /// Check if this is a root primitive.
    pub fn is_root(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Root)
    }

    /// Check if this is a savepoint primitive.
    pub fn is_savepoint(&self) -> bool {
        matches!(self.kind, PrimitiveKind::Savepoint(_))
    }

    /// The savepoint name, for nested primitives.
    pub fn savepoint_id(&self) -> Option<&SavepointId> {
        match &self.kind {
            PrimitiveKind::Root => None,
            PrimitiveKind::Savepoint(sp) => Some(&sp.id),
        }
    }

    /// Start this nesting level.
    pub fn begin(&mut self) -> TransactionResult<()> {
        self.require("begin", PrimitiveState::Pending)?;
        let sql = match &self.kind {
            PrimitiveKind::Root => dialect::BEGIN_SQL.to_string(),
            PrimitiveKind::Savepoint(sp) => dialect::savepoint_sql(&sp.id),
        };
        self.execute(sql)?;
        self.state = PrimitiveState::Active;
        Ok(())
    }

    /// Make this nesting level's work part of the enclosing level.
    pub fn commit(&mut self) -> TransactionResult<()> {
        self.require("commit", PrimitiveState::Active)?;
        let sql = match &self.kind {
            PrimitiveKind::Root => Some(dialect::COMMIT_SQL.to_string()),
            PrimitiveKind::Savepoint(sp) => match sp.commit {
                SavepointCommit::Release => Some(dialect::release_sql(&sp.id)),
                SavepointCommit::NoOp => {
                    log::debug!(
                        "savepoint {} commit is a no-op for {}",
                        sp.id,
                        sp.adapter_kind
                    );
                    None
                }
            },
        };
        if let Some(sql) = sql {
            self.execute(sql)?;
        }
        self.state = PrimitiveState::Committed;
        Ok(())
    }

    /// Undo this nesting level's work.
    ///
    /// For a savepoint this only unwinds to the savepoint; savepoints nested
    /// inside it are discarded by the backend.
    pub fn rollback(&mut self) -> TransactionResult<()> {
        self.require("rollback", PrimitiveState::Active)?;
        let sql = match &self.kind {
            PrimitiveKind::Root => dialect::ROLLBACK_SQL.to_string(),
            PrimitiveKind::Savepoint(sp) => dialect::rollback_to_sql(&sp.id),
        };
        self.execute(sql)?;
        self.state = PrimitiveState::RolledBack;
        Ok(())
    }

    /// Release primitive-held resources. The connection is not owned here,
    /// so nothing is executed.
    pub fn close(&mut self) -> TransactionResult<()> {
        match self.state {
            PrimitiveState::Pending | PrimitiveState::Committed | PrimitiveState::RolledBack => {
                self.state = PrimitiveState::Closed;
                Ok(())
            }
            state => Err(TransactionError::invalid_state("close", state)),
        }
    }

    fn require(&self, operation: &'static str, expected: PrimitiveState) -> TransactionResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransactionError::invalid_state(operation, self.state))
        }
    }

    fn execute(&self, sql: String) -> TransactionResult<()> {
        log::debug!("{}: {}", self.label(), sql);
        let command = self.connection.create_command(sql);
        let sql = command.sql().to_string();
        command
            .execute_non_query()
            .map_err(|source| TransactionError::statement(sql, source))
    }

    fn label(&self) -> String {
        match &self.kind {
            PrimitiveKind::Root => "root".to_string(),
            PrimitiveKind::Savepoint(sp) => format!("savepoint {}", sp.id),
        }
    }
}

impl fmt::Debug for TransactionPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionPrimitive")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ConnectionError, MemoryConnection};

    fn setup() -> (Arc<MemoryConnection>, Arc<dyn Connection>) {
        let conn = Arc::new(MemoryConnection::new());
        let shared: Arc<dyn Connection> = conn.clone();
        (conn, shared)
    }

    fn nested(
        shared: &Arc<dyn Connection>,
        id: &str,
        commit: SavepointCommit,
    ) -> TransactionPrimitive {
        TransactionPrimitive::savepoint(
            Arc::clone(shared),
            SavepointId::new(id),
            "PostgresAdapter",
            commit,
        )
    }

    #[test]
    fn test_root_commit() {
        let (conn, shared) = setup();
        let mut root = TransactionPrimitive::root(shared);
        assert!(root.is_root());
        assert!(root.savepoint_id().is_none());

        root.begin().unwrap();
        assert_eq!(root.state(), PrimitiveState::Active);
        root.commit().unwrap();
        root.close().unwrap();

        assert_eq!(conn.statements(), vec!["BEGIN", "COMMIT"]);
        assert_eq!(root.state(), PrimitiveState::Closed);
    }

    #[test]
    fn test_root_rollback() {
        let (conn, shared) = setup();
        let mut root = TransactionPrimitive::root(shared);
        root.begin().unwrap();
        root.rollback().unwrap();
        root.close().unwrap();
        assert_eq!(conn.statements(), vec!["BEGIN", "ROLLBACK"]);
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_terminal_before_begin_is_invalid() {
        let (conn, shared) = setup();
        let mut root = TransactionPrimitive::root(shared);

        let err = root.commit().unwrap_err();
        assert!(matches!(
            err,
            TransactionError::InvalidState {
                operation: "commit",
                state: PrimitiveState::Pending,
            }
        ));
        assert!(root.rollback().is_err());
        assert_eq!(conn.statement_count(), 0);
    }

    #[test]
    fn test_double_terminal_is_invalid() {
        let (conn, shared) = setup();
        let mut root = TransactionPrimitive::root(shared);
        root.begin().unwrap();
        root.commit().unwrap();

        for err in [root.commit().unwrap_err(), root.rollback().unwrap_err()] {
            assert!(matches!(
                err,
                TransactionError::InvalidState {
                    state: PrimitiveState::Committed,
                    ..
                }
            ));
        }
        assert!(root.begin().is_err());
        assert_eq!(conn.statement_count(), 2);
    }

    #[test]
    fn test_close_rules() {
        let (_conn, shared) = setup();

        let mut unused = TransactionPrimitive::root(Arc::clone(&shared));
        unused.close().unwrap();
        assert!(matches!(
            unused.close(),
            Err(TransactionError::InvalidState {
                operation: "close",
                state: PrimitiveState::Closed,
            })
        ));

        let mut open = TransactionPrimitive::root(shared);
        open.begin().unwrap();
        assert!(matches!(
            open.close(),
            Err(TransactionError::InvalidState {
                operation: "close",
                state: PrimitiveState::Active,
            })
        ));
    }

    #[test]
    fn test_savepoint_release() {
        let (conn, shared) = setup();
        let mut root = TransactionPrimitive::root(Arc::clone(&shared));
        root.begin().unwrap();

        let mut sp = nested(&shared, "abc1234de56", SavepointCommit::Release);
        assert!(sp.is_savepoint());
        sp.begin().unwrap();
        assert_eq!(conn.savepoints(), vec!["abc1234de56"]);
        sp.commit().unwrap();
        sp.close().unwrap();
        assert!(conn.savepoints().is_empty());

        root.commit().unwrap();
        assert_eq!(
            conn.statements(),
            vec![
                "BEGIN",
                "SAVEPOINT \"abc1234de56\"",
                "RELEASE SAVEPOINT \"abc1234de56\"",
                "COMMIT",
            ]
        );
    }

    #[test]
    fn test_savepoint_rollback_then_outer_commit() {
        let (conn, shared) = setup();
        let mut root = TransactionPrimitive::root(Arc::clone(&shared));
        root.begin().unwrap();

        let mut sp = nested(&shared, "abc1234de56", SavepointCommit::Release);
        sp.begin().unwrap();
        conn.execute("INSERT INTO users (name) VALUES ('Alice')").unwrap();
        sp.rollback().unwrap();
        sp.close().unwrap();
        assert!(conn.in_transaction());

        root.commit().unwrap();
        root.close().unwrap();

        let statements = conn.statements();
        assert_eq!(
            statements,
            vec![
                "BEGIN",
                "SAVEPOINT \"abc1234de56\"",
                "INSERT INTO users (name) VALUES ('Alice')",
                "ROLLBACK TO SAVEPOINT \"abc1234de56\"",
                "COMMIT",
            ]
        );
        let rollback_at = statements
            .iter()
            .position(|s| s.starts_with("ROLLBACK TO"))
            .unwrap();
        assert!(statements[rollback_at + 1..]
            .iter()
            .all(|s| !s.contains("abc1234de56")));
    }

    #[test]
    fn test_noop_commit_executes_nothing() {
        let (conn, shared) = setup();
        conn.execute("BEGIN").unwrap();

        let mut sp = TransactionPrimitive::savepoint(
            Arc::clone(&shared),
            SavepointId::new("abc1234de56"),
            "OracleAdapter",
            SavepointCommit::NoOp,
        );
        sp.begin().unwrap();
        let before = conn.statement_count();
        sp.commit().unwrap();
        assert_eq!(conn.statement_count(), before);
        assert_eq!(sp.state(), PrimitiveState::Committed);
    }

    #[test]
    fn test_rejected_statement_leaves_state() {
        let (conn, shared) = setup();
        let mut root = TransactionPrimitive::root(Arc::clone(&shared));
        root.begin().unwrap();

        conn.fail_statements_containing("RELEASE");
        let mut sp = nested(&shared, "abc1234de56", SavepointCommit::Release);
        sp.begin().unwrap();

        let err = sp.commit().unwrap_err();
        match err {
            TransactionError::StatementExecution { sql, source } => {
                assert_eq!(sql, "RELEASE SAVEPOINT \"abc1234de56\"");
                assert!(matches!(source, ConnectionError::Rejected(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sp.state(), PrimitiveState::Active);

        sp.rollback().unwrap();
        assert_eq!(sp.state(), PrimitiveState::RolledBack);
    }

    #[test]
    fn test_savepoint_without_root_fails_in_backend() {
        let (_conn, shared) = setup();
        let mut sp = nested(&shared, "orphan", SavepointCommit::Release);
        let err = sp.begin().unwrap_err();
        assert_eq!(
            err.connection_error(),
            Some(&ConnectionError::NoTransaction)
        );
        assert_eq!(sp.state(), PrimitiveState::Pending);
    }
}
