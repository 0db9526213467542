//! Primitive selection.
//!
//! The only nested-versus-flat decision in the crate: an adapter with an
//! open transaction scope gets a savepoint primitive on its current
//! connection, any other adapter gets a root primitive.

use std::sync::Arc;

use crate::adapter::Adapter;
use crate::config::NestingConfig;
use crate::savepoint::{IdGenerator, SavepointCommit};
use crate::transaction::error::TransactionResult;
use crate::transaction::primitive::TransactionPrimitive;

/// Builds the primitive for an adapter joining a transaction scope.
pub trait Dispatcher: Send + Sync {
    fn create_primitive(&self, adapter: &dyn Adapter) -> TransactionPrimitive;
}

/// Dispatcher that nests scopes as savepoints.
#[derive(Debug, Clone)]
pub struct NestingDispatcher {
    config: NestingConfig,
    ids: IdGenerator,
}

impl NestingDispatcher {
    /// Dispatcher with default configuration.
    pub fn new() -> Self {
        Self {
            config: NestingConfig::default(),
            ids: IdGenerator::global().clone(),
        }
    }

    /// Dispatcher with custom configuration.
    pub fn with_config(config: NestingConfig) -> TransactionResult<Self> {
        config.validate()?;
        let ids = IdGenerator::from_config(&config);
        Ok(Self { config, ids })
    }

    /// Get the configuration in use.
    pub fn config(&self) -> &NestingConfig {
        &self.config
    }
}

impl Default for NestingDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for NestingDispatcher {
    fn create_primitive(&self, adapter: &dyn Adapter) -> TransactionPrimitive {
        let connection = adapter.current_connection();
        match adapter.current_transaction() {
            Some(outer) => {
                let id = self.ids.next_id();
                let commit = SavepointCommit::for_adapter_kind(
                    adapter.adapter_kind(),
                    &self.config.noop_commit_families,
                );
                log::debug!(
                    "adapter {} inside scope {}: savepoint {}",
                    adapter.name(),
                    outer,
                    id
                );
                TransactionPrimitive::savepoint(connection, id, adapter.adapter_kind(), commit)
            }
            None => {
                log::debug!(
                    "adapter {} has no open scope: root transaction",
                    adapter.name()
                );
                TransactionPrimitive::root(connection)
            }
        }
    }
}

/// Dispatcher that always opens a root transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatDispatcher;

impl Dispatcher for FlatDispatcher {
    fn create_primitive(&self, adapter: &dyn Adapter) -> TransactionPrimitive {
        log::debug!("adapter {}: root transaction", adapter.name());
        TransactionPrimitive::root(adapter.current_connection())
    }
}

/// Pick the dispatcher a configuration asks for.
pub fn dispatcher_for(config: NestingConfig) -> TransactionResult<Arc<dyn Dispatcher>> {
    if config.nested {
        Ok(Arc::new(NestingDispatcher::with_config(config)?))
    } else {
        config.validate()?;
        Ok(Arc::new(FlatDispatcher))
    }
}
