//! Handle registry
//!
//! The foreign consumer only ever sees an opaque `void*`. Instead of casting
//! that pointer back to a bridge, it carries a numeric [`BridgeHandle`] that is
//! looked up here. Unknown or stale handles resolve to nothing.
//!
//! Bridges are not thread-safe, so the registry is per thread: a bridge can
//! only be reached from the thread that registered it.

use crate::bridge::ExportBridge;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::os::raw::c_void;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of handle values. Shared by all threads so handles never repeat.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static BRIDGES: RefCell<HashMap<BridgeHandle, Rc<RefCell<ExportBridge>>>> =
        RefCell::new(HashMap::new());
}

/// Opaque identity of one bridge instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeHandle(NonZeroU64);

impl BridgeHandle {
    pub(crate) fn allocate() -> Self {
        let raw = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn value(&self) -> u64 {
        self.0.get()
    }

    /// The handle as the opaque user-data pointer given to the consumer
    pub fn as_ptr(&self) -> *mut c_void {
        self.0.get() as usize as *mut c_void
    }

    /// Recover a handle from user data; `None` for a null pointer
    pub fn from_ptr(user_data: *mut c_void) -> Option<Self> {
        NonZeroU64::new(user_data as usize as u64).map(Self)
    }
}

impl fmt::Display for BridgeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) fn register(handle: BridgeHandle, bridge: Rc<RefCell<ExportBridge>>) {
    BRIDGES.with(|bridges| {
        bridges.borrow_mut().insert(handle, bridge);
    });
    log::debug!("Registered bridge {}", handle);
}

/// Remove a bridge; false if it was not registered on this thread
pub(crate) fn unregister(handle: BridgeHandle) -> bool {
    // The thread-local may already be gone during thread teardown.
    let removed = BRIDGES
        .try_with(|bridges| bridges.borrow_mut().remove(&handle).is_some())
        .unwrap_or(false);
    if removed {
        log::debug!("Unregistered bridge {}", handle);
    }
    removed
}

pub(crate) fn resolve(handle: BridgeHandle) -> Option<Rc<RefCell<ExportBridge>>> {
    BRIDGES
        .try_with(|bridges| bridges.borrow().get(&handle).cloned())
        .ok()
        .flatten()
}

/// Number of bridges registered on the current thread
pub fn registered_count() -> usize {
    BRIDGES
        .try_with(|bridges| bridges.borrow().len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_non_null() {
        let a = BridgeHandle::allocate();
        let b = BridgeHandle::allocate();
        assert_ne!(a, b);
        assert!(!a.as_ptr().is_null());
        assert_eq!(BridgeHandle::from_ptr(a.as_ptr()), Some(a));
        assert_eq!(BridgeHandle::from_ptr(std::ptr::null_mut()), None);
    }

    #[test]
    fn test_register_resolve_unregister() {
        let bridge = ExportBridge::new();
        let handle = bridge.handle();
        register(handle, Rc::new(RefCell::new(bridge)));

        assert!(resolve(handle).is_some());
        assert!(unregister(handle));
        assert!(resolve(handle).is_none());
        assert!(!unregister(handle));
    }

    #[test]
    fn test_registry_is_thread_confined() {
        let bridge = ExportBridge::new();
        let handle = bridge.handle();
        register(handle, Rc::new(RefCell::new(bridge)));

        let seen_elsewhere = std::thread::spawn(move || resolve(handle).is_some())
            .join()
            .unwrap();
        assert!(!seen_elsewhere);

        unregister(handle);
    }
}
