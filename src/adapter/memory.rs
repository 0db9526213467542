//! In-process connection that records and validates statements.
//!
//! Transactional statements are checked against PostgreSQL-style rules:
//! one open transaction at a time, savepoints only inside it, `ROLLBACK TO`
//! keeps the target savepoint and discards the ones nested inside it,
//! `RELEASE` discards the target and everything nested inside it. Any other
//! statement that parses is accepted as work.

use std::sync::Arc;

use parking_lot::Mutex;
use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::error::{ConnectionError, ConnectionResult};
use super::{Adapter, Connection};
use crate::transaction::ScopeId;

/// Transaction-control classification of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ControlStatement {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    Release(String),
    RollbackTo(String),
    Work,
}

impl ControlStatement {
    fn parse(sql: &str) -> ConnectionResult<Self> {
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(ConnectionError::Syntax("empty statement".into()));
        }

        // Bare forms first; dialect support for these varies across parser versions.
        let upper = sql.to_uppercase();
        match upper.as_str() {
            "BEGIN" | "BEGIN TRANSACTION" | "START TRANSACTION" => return Ok(Self::Begin),
            "COMMIT" | "COMMIT TRANSACTION" | "END" => return Ok(Self::Commit),
            "ROLLBACK" | "ROLLBACK TRANSACTION" => return Ok(Self::Rollback),
            _ => {}
        }

        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;
        let [statement] = statements.as_slice() else {
            return Err(ConnectionError::Unsupported(format!(
                "expected one statement, found {}",
                statements.len()
            )));
        };

        Ok(match statement {
            sp::Statement::StartTransaction { .. } => Self::Begin,
            sp::Statement::Commit { .. } => Self::Commit,
            sp::Statement::Rollback {
                savepoint: Some(name),
                ..
            } => Self::RollbackTo(name.value.clone()),
            sp::Statement::Rollback { .. } => Self::Rollback,
            sp::Statement::Savepoint { name, .. } => Self::Savepoint(name.value.clone()),
            sp::Statement::ReleaseSavepoint { name, .. } => Self::Release(name.value.clone()),
            _ => Self::Work,
        })
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    in_transaction: bool,
    savepoints: Vec<String>,
    log: Vec<String>,
    fail_fragments: Vec<String>,
}

impl ConnectionState {
    fn require_transaction(&self) -> ConnectionResult<()> {
        if self.in_transaction {
            Ok(())
        } else {
            Err(ConnectionError::NoTransaction)
        }
    }

    fn savepoint_position(&self, name: &str) -> ConnectionResult<usize> {
        self.savepoints
            .iter()
            .rposition(|sp| sp == name)
            .ok_or_else(|| ConnectionError::NoSuchSavepoint(name.to_string()))
    }

    fn apply(&mut self, statement: ControlStatement) -> ConnectionResult<()> {
        match statement {
            ControlStatement::Begin => {
                if self.in_transaction {
                    return Err(ConnectionError::TransactionAlreadyOpen);
                }
                self.in_transaction = true;
            }
            ControlStatement::Commit | ControlStatement::Rollback => {
                self.require_transaction()?;
                self.in_transaction = false;
                self.savepoints.clear();
            }
            ControlStatement::Savepoint(name) => {
                self.require_transaction()?;
                self.savepoints.push(name);
            }
            ControlStatement::Release(name) => {
                self.require_transaction()?;
                let pos = self.savepoint_position(&name)?;
                self.savepoints.truncate(pos);
            }
            ControlStatement::RollbackTo(name) => {
                self.require_transaction()?;
                let pos = self.savepoint_position(&name)?;
                self.savepoints.truncate(pos + 1);
            }
            ControlStatement::Work => {}
        }
        Ok(())
    }
}

/// A recording connection with no storage behind it.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    state: Mutex<ConnectionState>,
}

impl MemoryConnection {
    /// Create a connection with no open transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement submitted so far, including rejected ones.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Number of statements submitted so far.
    pub fn statement_count(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Forget recorded statements. Transaction state is kept.
    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Whether a root transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().in_transaction
    }

    /// Open savepoints, outermost first.
    pub fn savepoints(&self) -> Vec<String> {
        self.state.lock().savepoints.clone()
    }

    /// Reject every later statement whose text contains `fragment`.
    pub fn fail_statements_containing(&self, fragment: impl Into<String>) {
        self.state.lock().fail_fragments.push(fragment.into());
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.state.lock().fail_fragments.clear();
    }
}

impl Connection for MemoryConnection {
    fn execute(&self, sql: &str) -> ConnectionResult<()> {
        let mut state = self.state.lock();
        state.log.push(sql.to_string());

        let injected = state
            .fail_fragments
            .iter()
            .find(|fragment| sql.contains(fragment.as_str()));
        if let Some(fragment) = injected {
            return Err(ConnectionError::Rejected(format!(
                "injected failure matching {:?}",
                fragment
            )));
        }

        let statement = ControlStatement::parse(sql)?;
        state.apply(statement)
    }
}

/// Adapter over a single [`MemoryConnection`].
#[derive(Debug)]
pub struct MemoryAdapter {
    name: String,
    kind: String,
    connection: Arc<MemoryConnection>,
    scopes: Mutex<Vec<ScopeId>>,
}

impl MemoryAdapter {
    /// Create an adapter over a fresh connection.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            connection: Arc::new(MemoryConnection::new()),
            scopes: Mutex::new(Vec::new()),
        }
    }

    /// The concrete connection, for inspection.
    pub fn connection(&self) -> &Arc<MemoryConnection> {
        &self.connection
    }

    /// Number of scopes currently open on this adapter.
    pub fn depth(&self) -> usize {
        self.scopes.lock().len()
    }
}

impl Adapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter_kind(&self) -> &str {
        &self.kind
    }

    fn current_connection(&self) -> Arc<dyn Connection> {
        self.connection.clone()
    }

    fn current_transaction(&self) -> Option<ScopeId> {
        self.scopes.lock().last().copied()
    }

    fn push_transaction(&self, scope: ScopeId) {
        self.scopes.lock().push(scope);
    }

    fn pop_transaction(&self) -> Option<ScopeId> {
        self.scopes.lock().pop()
    }
}
