//! Transaction scope driver.
//!
//! A scope is one logical unit of work spanning one or more adapters. It
//! binds each adapter to a primitive through its own registry and drives
//! all of them together. While code runs [`within`](TransactionScope::within)
//! a scope, the scope is the adapters' current transaction, so any scope
//! opened inside nests as a savepoint.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::adapter::Adapter;
use crate::transaction::dispatch::Dispatcher;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::primitive::{PrimitiveState, TransactionPrimitive};
use crate::transaction::registry::TransactionRegistry;

/// Identity of a transaction scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(Ulid);

impl ScopeId {
    /// Generate a fresh scope id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

/// Lifecycle position of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Adapters may be linked.
    None,
    /// Every primitive has begun.
    Begun,
    /// Every primitive has committed and closed.
    Committed,
    /// Primitives were rolled back and closed.
    RolledBack,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeState::None => "none",
            ScopeState::Begun => "begun",
            ScopeState::Committed => "committed",
            ScopeState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// A unit of work over one or more adapters.
pub struct TransactionScope {
    id: ScopeId,
    started_at: DateTime<Utc>,
    registry: TransactionRegistry,
    state: ScopeState,
}

impl TransactionScope {
    /// Create an empty scope whose primitives come from `dispatcher`.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            id: ScopeId::new(),
            started_at: Utc::now(),
            registry: TransactionRegistry::new(dispatcher),
            state: ScopeState::None,
        }
    }

    /// Get the scope id.
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> ScopeState {
        self.state
    }

    /// When the scope was created.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the adapter bindings.
    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// The primitive bound to `adapter` in this scope.
    pub fn primitive(&self, adapter: &Arc<dyn Adapter>) -> Option<&TransactionPrimitive> {
        self.registry.primitive(adapter)
    }

    /// Add an adapter to the scope. Only allowed before `begin`.
    pub fn link(&mut self, adapter: &Arc<dyn Adapter>) -> TransactionResult<()> {
        self.require("link", ScopeState::None)?;
        self.registry.connect(adapter)?;
        Ok(())
    }

    /// Begin every primitive in link order.
    ///
    /// If one fails, those already begun are rolled back, all are closed,
    /// and the scope ends rolled back.
    pub fn begin(&mut self) -> TransactionResult<()> {
        self.require("begin", ScopeState::None)?;
        log::debug!("scope {} begin ({} adapters)", self.id, self.registry.len());

        let mut primitives: Vec<&mut TransactionPrimitive> =
            self.registry.primitives_mut().collect();
        let failure = primitives
            .iter_mut()
            .enumerate()
            .find_map(|(i, p)| p.begin().err().map(|e| (i, e)));

        if let Some((failed_at, err)) = failure {
            log::warn!("scope {} failed to begin: {}", self.id, err);
            for primitive in primitives[..failed_at].iter_mut().rev() {
                if let Err(e) = primitive.rollback() {
                    log::warn!("scope {} rollback after failed begin: {}", self.id, e);
                }
            }
            self.close_all();
            self.state = ScopeState::RolledBack;
            return Err(err);
        }

        self.state = ScopeState::Begun;
        Ok(())
    }

    /// Commit every primitive in link order, then close them.
    ///
    /// On the first failure the failed primitive and every primitive not
    /// yet committed are rolled back instead, and the first error returned.
    pub fn commit(&mut self) -> TransactionResult<()> {
        self.require("commit", ScopeState::Begun)?;
        log::debug!("scope {} commit", self.id);

        let mut first_err: Option<TransactionError> = None;
        for primitive in self.registry.primitives_mut() {
            if first_err.is_none() {
                match primitive.commit() {
                    Ok(()) => continue,
                    Err(e) => first_err = Some(e),
                }
            }
            if let Err(e) = primitive.rollback() {
                log::warn!("scope {} rollback after failed commit: {}", self.id, e);
            }
        }

        self.close_all();
        match first_err {
            None => {
                self.state = ScopeState::Committed;
                Ok(())
            }
            Some(err) => {
                self.state = ScopeState::RolledBack;
                Err(err)
            }
        }
    }

    /// Roll back every primitive, then close them. Every primitive is
    /// attempted; the first error is returned.
    pub fn rollback(&mut self) -> TransactionResult<()> {
        self.require("rollback", ScopeState::Begun)?;
        log::debug!("scope {} rollback", self.id);

        let mut first_err: Option<TransactionError> = None;
        for primitive in self.registry.primitives_mut() {
            if let Err(e) = primitive.rollback() {
                log::warn!("scope {} rollback failed: {}", self.id, e);
                first_err.get_or_insert(e);
            }
        }

        self.close_all();
        self.state = ScopeState::RolledBack;
        first_err.map_or(Ok(()), Err)
    }

    /// Run `f` with this scope as the current transaction of every linked
    /// adapter. The adapters are restored when `f` returns or unwinds.
    pub fn within<T>(&self, f: impl FnOnce() -> T) -> TransactionResult<T> {
        self.require("run within", ScopeState::Begun)?;
        let _guard = CurrentScopeGuard::push(self);
        Ok(f())
    }

    fn close_all(&mut self) {
        for primitive in self.registry.primitives_mut() {
            if primitive.state() == PrimitiveState::Closed {
                continue;
            }
            if let Err(e) = primitive.close() {
                log::warn!("scope {} close failed: {}", self.id, e);
            }
        }
    }

    fn require(&self, operation: &'static str, expected: ScopeState) -> TransactionResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransactionError::InvalidScopeState {
                operation,
                state: self.state,
            })
        }
    }
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.state == ScopeState::Begun {
            log::warn!("scope {} dropped without commit or rollback", self.id);
        }
    }
}

/// Pops the scope off its adapters on drop.
struct CurrentScopeGuard<'a> {
    scope: &'a TransactionScope,
}

impl<'a> CurrentScopeGuard<'a> {
    fn push(scope: &'a TransactionScope) -> Self {
        for adapter in scope.registry.adapters() {
            adapter.push_transaction(scope.id);
        }
        Self { scope }
    }
}

impl Drop for CurrentScopeGuard<'_> {
    fn drop(&mut self) {
        for adapter in self.scope.registry.adapters() {
            match adapter.pop_transaction() {
                Some(id) if id == self.scope.id => {}
                other => log::warn!(
                    "adapter {} popped {:?} while leaving scope {}",
                    adapter.name(),
                    other,
                    self.scope.id
                ),
            }
        }
    }
}

/// Run `f` in a new scope over `adapters`.
///
/// The scope commits if `f` returns `Ok` and rolls back if it returns
/// `Err`; the body's error is returned unchanged. Called inside another
/// scope on the same adapters, this nests as savepoints.
pub fn with_transaction<T, E, F>(
    dispatcher: &Arc<dyn Dispatcher>,
    adapters: &[Arc<dyn Adapter>],
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<TransactionError>,
{
    let mut scope = TransactionScope::new(Arc::clone(dispatcher));
    for adapter in adapters {
        scope.link(adapter)?;
    }
    scope.begin()?;

    match scope.within(f)? {
        Ok(value) => {
            scope.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = scope.rollback() {
                log::warn!(
                    "scope {} rollback after error failed: {}",
                    scope.id(),
                    rollback_err
                );
            }
            Err(e)
        }
    }
}
