//! Handle pool
//!
//! Each transport gets at most one [`AtHandler`]. Users acquire a handle by
//! transport identity and release it when done; the handle leaves the pool
//! when its last user releases it.
//!
//! A released handle can outlive its pool entry if a subsystem `Arc` is still
//! held somewhere. The pool keeps a weak reference to it and hands the same
//! handle out again on the next acquire, so two engines never share a port.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use cell_at::{AtHandler, Connector, TransportId};
use tracing::{debug, warn};

/// A pooled handle and the number of users holding it
struct PoolEntry {
    handle: Arc<AtHandler>,
    refs: usize,
}

/// Reference-counted AT handlers keyed by transport
pub struct HandlePool {
    connector: Arc<dyn Connector>,
    entries: HashMap<TransportId, PoolEntry>,
    retired: HashMap<TransportId, Weak<AtHandler>>,
    default_timeout: Duration,
    debug: bool,
}

impl std::fmt::Debug for HandlePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePool")
            .field("transports", &self.transports().collect::<Vec<_>>())
            .field("default_timeout", &self.default_timeout)
            .field("debug", &self.debug)
            .finish()
    }
}

impl HandlePool {
    /// Create an empty pool; new handles inherit `default_timeout` and `debug`
    pub fn new(connector: Arc<dyn Connector>, default_timeout: Duration, debug: bool) -> Self {
        Self {
            connector,
            entries: HashMap::new(),
            retired: HashMap::new(),
            default_timeout,
            debug,
        }
    }

    /// Get the handle for `transport`, opening it on first use
    ///
    /// Returns `None` if the transport cannot be opened.
    pub fn acquire(&mut self, transport: &TransportId) -> Option<Arc<AtHandler>> {
        if let Some(entry) = self.entries.get_mut(transport) {
            entry.refs += 1;
            debug!("Reusing AT handler for {} ({} users)", transport, entry.refs);
            return Some(entry.handle.clone());
        }

        if let Some(handle) = self.retired.remove(transport).and_then(|weak| weak.upgrade()) {
            handle.set_default_timeout(self.default_timeout);
            handle.set_debug(self.debug);
            self.entries.insert(
                transport.clone(),
                PoolEntry {
                    handle: handle.clone(),
                    refs: 1,
                },
            );
            debug!("Reclaimed AT handler for {} still held after release", transport);
            return Some(handle);
        }

        let stream = match self.connector.connect(transport) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("No AT handler for {}: {}", transport, e);
                return None;
            }
        };

        let handle = Arc::new(AtHandler::new(
            transport.clone(),
            stream,
            self.default_timeout,
            self.debug,
        ));
        self.entries.insert(
            transport.clone(),
            PoolEntry {
                handle: handle.clone(),
                refs: 1,
            },
        );
        debug!("Created AT handler for {}", transport);

        Some(handle)
    }

    /// Give back a handle obtained from [`acquire`](Self::acquire)
    pub fn release(&mut self, handle: &Arc<AtHandler>) {
        let transport = handle.transport_id();
        let Some(entry) = self.entries.get_mut(transport) else {
            warn!("Release of AT handler for {} that is not pooled", transport);
            return;
        };
        if !Arc::ptr_eq(&entry.handle, handle) {
            warn!("Release of foreign AT handler for {}", transport);
            return;
        }

        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            if let Some(entry) = self.entries.remove(transport) {
                self.retired.insert(transport.clone(), Arc::downgrade(&entry.handle));
            }
            self.retired.retain(|_, weak| weak.strong_count() > 0);
            debug!("Closed AT handler for {}", transport);
        } else {
            debug!("Released AT handler for {} ({} users)", transport, entry.refs);
        }
    }

    /// Set the default timeout of the pool and of every live handle
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.default_timeout = timeout;
        for entry in self.entries.values() {
            entry.handle.set_default_timeout(timeout);
        }
    }

    /// Enable or disable line logging on the pool and every live handle
    pub fn set_debug(&mut self, on: bool) {
        self.debug = on;
        for entry in self.entries.values() {
            entry.handle.set_debug(on);
        }
    }

    /// Default timeout given to new handles
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Whether new handles log every line
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Number of users holding the handle for `transport` (0 if none)
    pub fn ref_count(&self, transport: &TransportId) -> usize {
        self.entries.get(transport).map_or(0, |entry| entry.refs)
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handle is live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Transports that currently have a handle
    pub fn transports(&self) -> impl Iterator<Item = &TransportId> {
        self.entries.keys()
    }

    /// Drop every handle regardless of its users
    pub fn clear(&mut self) {
        self.retired.clear();
        for (transport, entry) in self.entries.drain() {
            debug!("Closing AT handler for {} ({} users left)", transport, entry.refs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cell_sim::VirtualModem;

    fn pool(modem: &VirtualModem) -> HandlePool {
        HandlePool::new(Arc::new(modem.clone()), Duration::from_millis(50), false)
    }

    #[test]
    fn test_same_transport_shares_handle() {
        let modem = VirtualModem::new();
        let mut pool = pool(&modem);
        let tty = TransportId::new("tty0");

        let a = pool.acquire(&tty).unwrap();
        let b = pool.acquire(&tty).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.ref_count(&tty), 2);
        assert_eq!(modem.connect_count(&tty), 1);

        pool.release(&a);
        assert_eq!(pool.ref_count(&tty), 1);
        pool.release(&b);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_distinct_transports_are_independent() {
        let modem = VirtualModem::new();
        let mut pool = pool(&modem);
        let tty0 = TransportId::new("tty0");
        let tty1 = TransportId::new("tty1");

        let a = pool.acquire(&tty0).unwrap();
        let b = pool.acquire(&tty1).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));

        pool.release(&a);
        assert_eq!(pool.ref_count(&tty0), 0);
        assert_eq!(pool.ref_count(&tty1), 1);
    }

    #[test]
    fn test_connect_failure_yields_no_handle() {
        let modem = VirtualModem::new();
        let tty = TransportId::new("tty9");
        modem.set_unreachable(&tty, true);
        let mut pool = pool(&modem);

        assert!(pool.acquire(&tty).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_settings_propagate_to_live_handles() {
        let modem = VirtualModem::new();
        let mut pool = pool(&modem);
        let handle = pool.acquire(&TransportId::new("tty0")).unwrap();

        pool.set_timeout(Duration::from_millis(300));
        pool.set_debug(true);
        assert_eq!(handle.default_timeout(), Duration::from_millis(300));
        assert!(handle.debug());

        let late = pool.acquire(&TransportId::new("tty1")).unwrap();
        assert_eq!(late.default_timeout(), Duration::from_millis(300));
        assert!(late.debug());
    }

    #[test]
    fn test_held_handle_is_reclaimed() {
        let modem = VirtualModem::new();
        let mut pool = pool(&modem);
        let tty = TransportId::new("tty0");

        let old = pool.acquire(&tty).unwrap();
        pool.release(&old);
        assert!(pool.is_empty());

        pool.set_timeout(Duration::from_millis(120));
        let current = pool.acquire(&tty).unwrap();
        assert!(Arc::ptr_eq(&old, &current));
        assert_eq!(current.default_timeout(), Duration::from_millis(120));
        assert_eq!(modem.connect_count(&tty), 1);
        assert_eq!(modem.live_links(), 1);

        pool.release(&current);
        drop(old);
        drop(current);
        assert_eq!(modem.live_links(), 0);

        // Nothing left to reclaim: the next acquire opens a new link
        pool.acquire(&tty).unwrap();
        assert_eq!(modem.connect_count(&tty), 2);
    }

    #[test]
    fn test_release_of_foreign_handle_is_ignored() {
        let modem = VirtualModem::new();
        let mut pool = pool(&modem);
        let tty = TransportId::new("tty0");

        let pooled = pool.acquire(&tty).unwrap();
        let foreign = Arc::new(AtHandler::new(
            tty.clone(),
            modem.connect(&tty).unwrap(),
            Duration::from_millis(50),
            false,
        ));

        pool.release(&foreign);
        assert_eq!(pool.ref_count(&tty), 1);
        pool.release(&pooled);
        assert!(pool.is_empty());
    }
}
