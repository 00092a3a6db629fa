//! C callback table
//!
//! The foreign pipeline drives the bridge through a `#[repr(C)]` table of
//! plain function pointers plus one opaque user-data value. Each function
//! resolves the user data through the handle registry and forwards to the
//! matching [`ExportBridge`] method.
//!
//! Nothing unwinds across this boundary: failures are logged, kept on the
//! bridge as `last_error`, and the slot returns its neutral value.

use crate::bridge::ExportBridge;
use crate::data_object::DataObject;
use crate::ffi::registry::{self, BridgeHandle};
use crate::types::{Extent, ExportError, DIMENSIONS};
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::os::raw::{c_char, c_double, c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

pub type UpdateInformationCallback = extern "C" fn(user_data: *mut c_void);
pub type PipelineModifiedCallback = extern "C" fn(user_data: *mut c_void) -> c_int;
pub type WholeExtentCallback = extern "C" fn(user_data: *mut c_void) -> *const c_int;
pub type SpacingCallback = extern "C" fn(user_data: *mut c_void) -> *const c_double;
pub type OriginCallback = extern "C" fn(user_data: *mut c_void) -> *const c_double;
pub type ScalarTypeCallback = extern "C" fn(user_data: *mut c_void) -> *const c_char;
pub type NumberOfComponentsCallback = extern "C" fn(user_data: *mut c_void) -> c_int;
pub type PropagateUpdateExtentCallback = extern "C" fn(user_data: *mut c_void, extent: *const c_int);
pub type UpdateDataCallback = extern "C" fn(user_data: *mut c_void);
pub type DataExtentCallback = extern "C" fn(user_data: *mut c_void) -> *const c_int;
pub type BufferPointerCallback = extern "C" fn(user_data: *mut c_void) -> *const c_void;

/// Returned by extent slots that cannot reach a bridge
static EMPTY_EXTENT: [c_int; 2 * DIMENSIONS] = [0, -1, 0, -1, 0, -1];
static UNIT_SPACING: [c_double; DIMENSIONS] = [1.0; DIMENSIONS];
static ZERO_ORIGIN: [c_double; DIMENSIONS] = [0.0; DIMENSIONS];

/// The fixed, ordered set of slots handed to the foreign consumer
///
/// Every function takes `callback_user_data` as its first argument. Extents
/// are six ints `[xmin, xmax, ymin, ymax, zmin, zmax]`; spacing and origin are
/// three doubles. Extent, spacing and origin pointers stay valid until the same
/// slot is called again or the session ends, and are never null. The scalar
/// type string is static; it is null only when no input is reachable.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallbackTable {
    pub callback_user_data: *mut c_void,
    pub update_information: UpdateInformationCallback,
    pub pipeline_modified: PipelineModifiedCallback,
    pub whole_extent: WholeExtentCallback,
    pub spacing: SpacingCallback,
    pub origin: OriginCallback,
    pub scalar_type: ScalarTypeCallback,
    pub number_of_components: NumberOfComponentsCallback,
    pub propagate_update_extent: PropagateUpdateExtentCallback,
    pub update_data: UpdateDataCallback,
    pub data_extent: DataExtentCallback,
    pub buffer_pointer: BufferPointerCallback,
}

impl CallbackTable {
    /// The table addressing the bridge registered under `handle`
    pub fn for_handle(handle: BridgeHandle) -> Self {
        Self {
            callback_user_data: handle.as_ptr(),
            update_information: update_information_callback,
            pipeline_modified: pipeline_modified_callback,
            whole_extent: whole_extent_callback,
            spacing: spacing_callback,
            origin: origin_callback,
            scalar_type: scalar_type_callback,
            number_of_components: number_of_components_callback,
            propagate_update_extent: propagate_update_extent_callback,
            update_data: update_data_callback,
            data_extent: data_extent_callback,
            buffer_pointer: buffer_pointer_callback,
        }
    }
}

/// A registered bridge together with its callback table.
///
/// The handle stays resolvable for as long as the session lives; dropping it
/// unregisters the bridge. Sessions are confined to the thread that created
/// them.
pub struct ExportSession {
    handle: BridgeHandle,
    bridge: Rc<RefCell<ExportBridge>>,
    table: CallbackTable,
}

impl ExportSession {
    /// Register `bridge` and build its table
    pub fn new(bridge: ExportBridge) -> Self {
        let handle = bridge.handle();
        let bridge = Rc::new(RefCell::new(bridge));
        registry::register(handle, Rc::clone(&bridge));
        log::info!("Export session {} opened", handle);
        Self {
            handle,
            bridge,
            table: CallbackTable::for_handle(handle),
        }
    }

    /// Convenience: a session exporting `input`
    pub fn for_input<D: DataObject + 'static>(input: &Rc<RefCell<D>>) -> Self {
        Self::new(ExportBridge::with_input(input))
    }

    pub fn table(&self) -> &CallbackTable {
        &self.table
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle
    }

    pub fn callback_user_data(&self) -> *mut c_void {
        self.table.callback_user_data
    }

    /// Borrow the bridge. Panics if a callback on this bridge is running.
    pub fn bridge(&self) -> Ref<'_, ExportBridge> {
        self.bridge.borrow()
    }

    /// Mutably borrow the bridge. Panics if a callback on this bridge is running.
    pub fn bridge_mut(&self) -> RefMut<'_, ExportBridge> {
        self.bridge.borrow_mut()
    }
}

impl Drop for ExportSession {
    fn drop(&mut self) {
        registry::unregister(self.handle);
        log::info!("Export session {} closed", self.handle);
    }
}

/// Resolve `user_data`, borrow the bridge and run `f`, falling back to
/// `neutral` when the bridge is unreachable, busy, or `f` panics.
fn dispatch<R>(
    slot: &'static str,
    user_data: *mut c_void,
    neutral: R,
    f: impl FnOnce(&mut ExportBridge) -> R,
) -> R {
    let Some(handle) = BridgeHandle::from_ptr(user_data) else {
        log::warn!("{}: null callback user data", slot);
        return neutral;
    };
    let Some(bridge) = registry::resolve(handle) else {
        log::warn!("{}: unknown bridge handle {}", slot, handle);
        return neutral;
    };
    let Ok(mut guard) = bridge.try_borrow_mut() else {
        log::error!("{}: re-entrant call on bridge {} refused", slot, handle);
        return neutral;
    };

    log::debug!("{} -> bridge {}", slot, handle);
    match panic::catch_unwind(AssertUnwindSafe(|| f(&mut guard))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("{}: bridge {} panicked: {}", slot, handle, message);
            guard.record_error(ExportError::CallbackPanicked(message));
            neutral
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Log a metadata failure and keep it on the bridge
fn note_failure(bridge: &mut ExportBridge, slot: &str, error: ExportError) {
    log::warn!("{}: bridge {}: {}", slot, bridge.handle(), error);
    bridge.record_error(error);
}

extern "C" fn update_information_callback(user_data: *mut c_void) {
    dispatch("UpdateInformation", user_data, (), |bridge| {
        if let Err(e) = bridge.update_information() {
            note_failure(bridge, "UpdateInformation", e);
        }
    })
}

extern "C" fn pipeline_modified_callback(user_data: *mut c_void) -> c_int {
    dispatch("PipelineModified", user_data, 0, |bridge| {
        c_int::from(bridge.pipeline_modified())
    })
}

extern "C" fn whole_extent_callback(user_data: *mut c_void) -> *const c_int {
    dispatch("WholeExtent", user_data, EMPTY_EXTENT.as_ptr(), |bridge| {
        let extent = bridge.whole_extent().unwrap_or_else(|e| {
            note_failure(bridge, "WholeExtent", e);
            Extent::empty()
        });
        bridge.exported.whole_extent = extent.as_array();
        bridge.exported.whole_extent.as_ptr()
    })
}

extern "C" fn spacing_callback(user_data: *mut c_void) -> *const c_double {
    dispatch("Spacing", user_data, UNIT_SPACING.as_ptr(), |bridge| {
        let spacing = bridge.spacing().unwrap_or_else(|e| {
            note_failure(bridge, "Spacing", e);
            UNIT_SPACING
        });
        bridge.exported.spacing = spacing;
        bridge.exported.spacing.as_ptr()
    })
}

extern "C" fn origin_callback(user_data: *mut c_void) -> *const c_double {
    dispatch("Origin", user_data, ZERO_ORIGIN.as_ptr(), |bridge| {
        let origin = bridge.origin().unwrap_or_else(|e| {
            note_failure(bridge, "Origin", e);
            ZERO_ORIGIN
        });
        bridge.exported.origin = origin;
        bridge.exported.origin.as_ptr()
    })
}

extern "C" fn scalar_type_callback(user_data: *mut c_void) -> *const c_char {
    dispatch("ScalarType", user_data, ptr::null(), |bridge| match bridge.scalar_type() {
        Ok(scalar_type) => scalar_type.as_c_str().as_ptr(),
        Err(e) => {
            note_failure(bridge, "ScalarType", e);
            ptr::null()
        }
    })
}

extern "C" fn number_of_components_callback(user_data: *mut c_void) -> c_int {
    dispatch("NumberOfComponents", user_data, 0, |bridge| {
        match bridge.number_of_components() {
            Ok(n) => c_int::try_from(n).unwrap_or(c_int::MAX),
            Err(e) => {
                note_failure(bridge, "NumberOfComponents", e);
                0
            }
        }
    })
}

extern "C" fn propagate_update_extent_callback(user_data: *mut c_void, extent: *const c_int) {
    if extent.is_null() {
        log::warn!("PropagateUpdateExtent: null extent ignored");
        return;
    }
    // SAFETY: the table contract requires `extent` to point at six readable ints.
    let bounds = unsafe { std::slice::from_raw_parts(extent, 2 * DIMENSIONS) };
    let Some(requested) = Extent::from_slice(bounds) else {
        return;
    };

    dispatch("PropagateUpdateExtent", user_data, (), |bridge| {
        if let Err(e) = bridge.propagate_update_extent(requested) {
            note_failure(bridge, "PropagateUpdateExtent", e);
        }
    })
}

extern "C" fn update_data_callback(user_data: *mut c_void) {
    dispatch("UpdateData", user_data, (), |bridge| {
        if let Err(e) = bridge.update_data() {
            log::error!("UpdateData: bridge {} failed to realize data: {}", bridge.handle(), e);
            bridge.record_error(e);
        }
    })
}

extern "C" fn data_extent_callback(user_data: *mut c_void) -> *const c_int {
    dispatch("DataExtent", user_data, EMPTY_EXTENT.as_ptr(), |bridge| {
        let extent = bridge.data_extent().unwrap_or_else(|e| {
            note_failure(bridge, "DataExtent", e);
            Extent::empty()
        });
        bridge.exported.data_extent = extent.as_array();
        bridge.exported.data_extent.as_ptr()
    })
}

extern "C" fn buffer_pointer_callback(user_data: *mut c_void) -> *const c_void {
    dispatch("BufferPointer", user_data, ptr::null(), |bridge| {
        bridge.buffer_pointer().unwrap_or_else(|e| {
            note_failure(bridge, "BufferPointer", e);
            ptr::null()
        })
    })
}
