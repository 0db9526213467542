//! Savepoint SQL text and per-backend commit behaviour.

use crate::savepoint::id::SavepointId;

/// How a savepoint is finished on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointCommit {
    /// `RELEASE SAVEPOINT "<id>"`.
    Release,
    /// Nothing is executed.
    NoOp,
}

impl SavepointCommit {
    /// Pick the commit behaviour for an adapter kind.
    ///
    /// A case-insensitive substring match against `noop_families`; no
    /// capability probing.
    pub fn for_adapter_kind<S: AsRef<str>>(adapter_kind: &str, noop_families: &[S]) -> Self {
        let kind = adapter_kind.to_lowercase();
        let noop = noop_families
            .iter()
            .map(|family| family.as_ref().to_lowercase())
            .any(|family| !family.is_empty() && kind.contains(&family));

        if noop {
            SavepointCommit::NoOp
        } else {
            SavepointCommit::Release
        }
    }
}

/// Quote an identifier with double quotes, doubling any embedded quote.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `SAVEPOINT "<id>"`.
pub fn savepoint_sql(id: &SavepointId) -> String {
    format!("SAVEPOINT {}", quote_identifier(id.as_str()))
}

/// `RELEASE SAVEPOINT "<id>"`.
pub fn release_sql(id: &SavepointId) -> String {
    format!("RELEASE SAVEPOINT {}", quote_identifier(id.as_str()))
}

/// `ROLLBACK TO SAVEPOINT "<id>"`.
pub fn rollback_to_sql(id: &SavepointId) -> String {
    format!("ROLLBACK TO SAVEPOINT {}", quote_identifier(id.as_str()))
}

/// Opens a root transaction.
pub const BEGIN_SQL: &str = "BEGIN";
/// Commits a root transaction.
pub const COMMIT_SQL: &str = "COMMIT";
/// Rolls back a root transaction.
pub const ROLLBACK_SQL: &str = "ROLLBACK";
