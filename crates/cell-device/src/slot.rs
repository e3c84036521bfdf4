//! Subsystem cache slots
//!
//! A slot holds at most one instance of a subsystem together with the AT
//! handle it was built on. Every `open` adds a user, every `close` removes
//! one; the instance is dropped and its handle returned to the pool when the
//! last user closes it.

use std::sync::Arc;

use cell_at::{AtHandler, TransportId};
use tracing::debug;

use crate::pool::HandlePool;

/// Lazily created, reference-counted subsystem
pub struct SubsystemSlot<T: ?Sized> {
    name: &'static str,
    instance: Option<Arc<T>>,
    handle: Option<Arc<AtHandler>>,
    refs: usize,
}

impl<T: ?Sized> SubsystemSlot<T> {
    /// Create an empty slot; `name` is used for logging
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            instance: None,
            handle: None,
            refs: 0,
        }
    }

    /// Get the subsystem, building it on `transport` if the slot is empty
    ///
    /// An existing instance is returned as is; `transport` only matters for
    /// the open that creates it. Returns `None`, leaving the slot untouched,
    /// if no handle can be acquired.
    pub fn open<F>(
        &mut self,
        pool: &mut HandlePool,
        transport: &TransportId,
        build: F,
    ) -> Option<Arc<T>>
    where
        F: FnOnce(Arc<AtHandler>) -> Arc<T>,
    {
        if self.instance.is_none() {
            let handle = pool.acquire(transport)?;
            self.instance = Some(build(handle.clone()));
            self.handle = Some(handle);
            debug!("Opened {} on {}", self.name, transport);
        }

        self.refs += 1;
        self.instance.clone()
    }

    /// Remove one user; the last one drops the instance
    pub fn close(&mut self, pool: &mut HandlePool) {
        if self.instance.is_none() {
            return;
        }

        self.refs = self.refs.saturating_sub(1);
        if self.refs == 0 {
            self.release(pool);
        }
    }

    /// Drop the instance whatever its user count
    pub fn force_close(&mut self, pool: &mut HandlePool) {
        if self.instance.is_none() {
            return;
        }

        if self.refs > 1 {
            debug!("Closing {} with {} users left", self.name, self.refs);
        }
        self.refs = 0;
        self.release(pool);
    }

    fn release(&mut self, pool: &mut HandlePool) {
        self.instance = None;
        if let Some(handle) = self.handle.take() {
            pool.release(&handle);
        }
        debug!("Closed {}", self.name);
    }

    /// Current instance, without adding a user
    pub fn get(&self) -> Option<Arc<T>> {
        self.instance.clone()
    }

    /// Handle the instance was built on
    pub fn handle(&self) -> Option<&Arc<AtHandler>> {
        self.handle.as_ref()
    }

    /// Number of users
    pub fn ref_count(&self) -> usize {
        self.refs
    }

    /// Whether an instance exists
    pub fn is_open(&self) -> bool {
        self.instance.is_some()
    }
}

impl<T: ?Sized> std::fmt::Debug for SubsystemSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemSlot")
            .field("name", &self.name)
            .field("open", &self.instance.is_some())
            .field("refs", &self.refs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use cell_sim::VirtualModem;

    struct Probe {
        at: Arc<AtHandler>,
    }

    fn setup() -> (VirtualModem, HandlePool, TransportId) {
        let modem = VirtualModem::new();
        let pool = HandlePool::new(Arc::new(modem.clone()), Duration::from_millis(50), false);
        (modem, pool, TransportId::new("tty0"))
    }

    #[test]
    fn test_open_builds_once() {
        let (_modem, mut pool, tty) = setup();
        let mut slot: SubsystemSlot<Probe> = SubsystemSlot::new("probe");
        let mut builds = 0;

        let a = slot
            .open(&mut pool, &tty, |at| {
                builds += 1;
                Arc::new(Probe { at })
            })
            .unwrap();
        let b = slot
            .open(&mut pool, &tty, |at| {
                builds += 1;
                Arc::new(Probe { at })
            })
            .unwrap();

        assert_eq!(builds, 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(slot.ref_count(), 2);
        assert_eq!(pool.ref_count(&tty), 1);
    }

    #[test]
    fn test_later_open_ignores_transport() {
        let (_modem, mut pool, tty) = setup();
        let mut slot: SubsystemSlot<Probe> = SubsystemSlot::new("probe");

        let a = slot.open(&mut pool, &tty, |at| Arc::new(Probe { at })).unwrap();
        let b = slot
            .open(&mut pool, &TransportId::new("tty1"), |at| Arc::new(Probe { at }))
            .unwrap();

        assert_eq!(b.at.transport_id(), &tty);
        assert!(Arc::ptr_eq(&a.at, &b.at));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_last_close_releases_handle() {
        let (_modem, mut pool, tty) = setup();
        let mut slot: SubsystemSlot<Probe> = SubsystemSlot::new("probe");

        slot.open(&mut pool, &tty, |at| Arc::new(Probe { at }));
        slot.open(&mut pool, &tty, |at| Arc::new(Probe { at }));

        slot.close(&mut pool);
        assert!(slot.is_open());
        assert_eq!(pool.ref_count(&tty), 1);

        slot.close(&mut pool);
        assert!(!slot.is_open());
        assert!(slot.handle().is_none());
        assert!(pool.is_empty());

        // Extra closes are harmless
        slot.close(&mut pool);
        assert_eq!(slot.ref_count(), 0);
    }

    #[test]
    fn test_failed_acquire_leaves_slot_empty() {
        let (modem, mut pool, tty) = setup();
        modem.set_unreachable(&tty, true);
        let mut slot: SubsystemSlot<Probe> = SubsystemSlot::new("probe");

        assert!(slot.open(&mut pool, &tty, |at| Arc::new(Probe { at })).is_none());
        assert_eq!(slot.ref_count(), 0);
        assert!(!slot.is_open());
    }

    #[test]
    fn test_force_close() {
        let (_modem, mut pool, tty) = setup();
        let mut slot: SubsystemSlot<Probe> = SubsystemSlot::new("probe");

        for _ in 0..3 {
            slot.open(&mut pool, &tty, |at| Arc::new(Probe { at }));
        }
        slot.force_close(&mut pool);

        assert!(!slot.is_open());
        assert!(pool.is_empty());
    }
}
