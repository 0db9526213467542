//! Per-scope binding of adapters to primitives.

use std::fmt;
use std::sync::Arc;

use crate::adapter::{Adapter, AdapterKey};
use crate::transaction::dispatch::Dispatcher;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::primitive::TransactionPrimitive;

struct RegistryEntry {
    key: AdapterKey,
    adapter: Arc<dyn Adapter>,
    primitive: TransactionPrimitive,
}

/// Maps each adapter in a transaction scope to its primitive.
///
/// An adapter is bound at most once. Entries keep connection order.
pub struct TransactionRegistry {
    dispatcher: Arc<dyn Dispatcher>,
    entries: Vec<RegistryEntry>,
}

impl TransactionRegistry {
    /// Create an empty registry using `dispatcher` for new bindings.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            dispatcher,
            entries: Vec::new(),
        }
    }

    /// Bind a new primitive for `adapter`.
    ///
    /// Fails with [`TransactionError::DuplicatePrimitive`] if the adapter is
    /// already bound; the existing binding is left untouched.
    pub fn connect(
        &mut self,
        adapter: &Arc<dyn Adapter>,
    ) -> TransactionResult<&mut TransactionPrimitive> {
        let key = AdapterKey::of(adapter);
        if self.position(key).is_some() {
            return Err(TransactionError::DuplicatePrimitive {
                adapter: adapter.name().to_string(),
            });
        }

        let primitive = self.dispatcher.create_primitive(adapter.as_ref());
        let index = self.entries.len();
        self.entries.push(RegistryEntry {
            key,
            adapter: Arc::clone(adapter),
            primitive,
        });
        Ok(&mut self.entries[index].primitive)
    }

    /// The primitive bound to `adapter`, if any.
    pub fn primitive(&self, adapter: &Arc<dyn Adapter>) -> Option<&TransactionPrimitive> {
        self.position(AdapterKey::of(adapter))
            .map(|i| &self.entries[i].primitive)
    }

    /// Mutable access to the primitive bound to `adapter`.
    pub fn primitive_mut(
        &mut self,
        adapter: &Arc<dyn Adapter>,
    ) -> Option<&mut TransactionPrimitive> {
        self.position(AdapterKey::of(adapter))
            .map(|i| &mut self.entries[i].primitive)
    }

    /// Check if `adapter` is bound.
    pub fn contains(&self, adapter: &Arc<dyn Adapter>) -> bool {
        self.position(AdapterKey::of(adapter)).is_some()
    }

    /// Number of bound adapters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no adapter is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound adapters in connection order.
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.entries.iter().map(|e| &e.adapter)
    }

    /// Bound primitives in connection order.
    pub(crate) fn primitives_mut(
        &mut self,
    ) -> impl DoubleEndedIterator<Item = &mut TransactionPrimitive> {
        self.entries.iter_mut().map(|e| &mut e.primitive)
    }

    fn position(&self, key: AdapterKey) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }
}

impl fmt::Debug for TransactionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.entries.iter().map(|e| (e.adapter.name(), &e.primitive));
        f.debug_list().entries(bindings).finish()
    }
}
