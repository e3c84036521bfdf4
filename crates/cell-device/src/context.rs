//! Context registry
//!
//! Data contexts are not shared: each one is created, owned by the device and
//! destroyed individually. The registry keeps them in creation order and
//! holds the pool reference each context took for its transport.

use std::sync::Arc;

use cell_at::{AtHandler, TransportId};
use tracing::debug;

use crate::pool::HandlePool;
use crate::subsystem::CellularContext;

/// Identity of a context in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

struct ContextEntry {
    id: ContextId,
    context: Arc<dyn CellularContext>,
    handle: Arc<AtHandler>,
}

/// Creation-ordered set of data contexts
pub struct ContextRegistry {
    entries: Vec<ContextEntry>,
    next_id: u32,
}

impl ContextRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Build a context on `transport` and append it to the registry
    ///
    /// Returns `None` if no handle can be acquired.
    pub fn create<F>(
        &mut self,
        pool: &mut HandlePool,
        transport: &TransportId,
        build: F,
    ) -> Option<ContextId>
    where
        F: FnOnce(Arc<AtHandler>, ContextId) -> Arc<dyn CellularContext>,
    {
        let handle = pool.acquire(transport)?;
        let id = ContextId(self.next_id);
        self.next_id += 1;

        let context = build(handle.clone(), id);
        self.entries.push(ContextEntry {
            id,
            context,
            handle,
        });
        debug!("Created context {} on {}", id.0, transport);

        Some(id)
    }

    /// Remove a context and return its handle to the pool
    ///
    /// Survivors keep their order. Returns `false` if `id` is not registered.
    pub fn destroy(&mut self, pool: &mut HandlePool, id: ContextId) -> bool {
        let Some(pos) = self.entries.iter().position(|entry| entry.id == id) else {
            debug!("Context {} is not registered", id.0);
            return false;
        };

        let entry = self.entries.remove(pos);
        drop(entry.context);
        pool.release(&entry.handle);
        debug!("Destroyed context {}", id.0);

        true
    }

    /// Destroy every context
    pub fn clear(&mut self, pool: &mut HandlePool) {
        for entry in self.entries.drain(..) {
            drop(entry.context);
            pool.release(&entry.handle);
            debug!("Destroyed context {}", entry.id.0);
        }
    }

    /// Look up a context
    pub fn get(&self, id: ContextId) -> Option<Arc<dyn CellularContext>> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.context.clone())
    }

    /// Registered contexts in creation order
    pub fn list(&self) -> Vec<ContextId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    /// Number of registered contexts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no context is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("contexts", &self.list())
            .finish()
    }
}
