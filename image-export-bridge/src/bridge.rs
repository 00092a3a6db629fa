//! Export bridge
//!
//! `ExportBridge` adapts one [`DataObject`] to the operations a foreign,
//! pull-based pipeline needs: cheap metadata queries, a dirty check, a
//! region request and a single data realization step that exposes the
//! buffer by pointer.
//!
//! The bridge owns nothing but its shadow modification time, its observers
//! and the small amount of storage backing pointer-returning callbacks. The
//! data object is held by weak reference; keeping it alive is the caller's
//! job.

use crate::data_object::DataObject;
use crate::events::{EventNotifier, ExportEvent, ObserverTag};
use crate::ffi::registry::BridgeHandle;
use crate::types::{Extent, ExportError, Result, ScalarType, Vector3, DIMENSIONS};
use crate::util::Indent;
use std::cell::RefCell;
use std::fmt;
use std::os::raw::c_void;
use std::rc::{Rc, Weak};

/// Where a bridge is in its export round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    /// Nothing has been negotiated yet
    Idle,
    /// Metadata has been propagated
    MetadataValid,
    /// The pipeline reported a change that has not been realized
    Dirty,
    /// The buffer reflects the current pipeline state
    DataValid,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Idle => write!(f, "Idle"),
            BridgeState::MetadataValid => write!(f, "MetadataValid"),
            BridgeState::Dirty => write!(f, "Dirty"),
            BridgeState::DataValid => write!(f, "DataValid"),
        }
    }
}

/// Storage behind the pointers returned by the callback table
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExportedMetadata {
    pub whole_extent: [i32; 2 * DIMENSIONS],
    pub data_extent: [i32; 2 * DIMENSIONS],
    pub spacing: Vector3,
    pub origin: Vector3,
}

impl Default for ExportedMetadata {
    fn default() -> Self {
        Self {
            whole_extent: Extent::empty().as_array(),
            data_extent: Extent::empty().as_array(),
            spacing: [1.0; DIMENSIONS],
            origin: [0.0; DIMENSIONS],
        }
    }
}

/// Adapter between one data object and a foreign pipeline
pub struct ExportBridge {
    handle: BridgeHandle,
    input: Option<Weak<RefCell<dyn DataObject>>>,
    /// Shadow copy of the input's pipeline time, used for change detection
    last_pipeline_mtime: u64,
    /// Pipeline time of the input when data was last realized
    realized_mtime: u64,
    state: BridgeState,
    notifier: EventNotifier,
    last_error: Option<ExportError>,
    pub(crate) exported: ExportedMetadata,
}

impl ExportBridge {
    /// Create a bridge with no input
    pub fn new() -> Self {
        Self {
            handle: BridgeHandle::allocate(),
            input: None,
            last_pipeline_mtime: 0,
            realized_mtime: 0,
            state: BridgeState::Idle,
            notifier: EventNotifier::new(),
            last_error: None,
            exported: ExportedMetadata::default(),
        }
    }

    /// Create a bridge exporting `input`
    pub fn with_input<D: DataObject + 'static>(input: &Rc<RefCell<D>>) -> Self {
        let mut bridge = Self::new();
        bridge.set_input(input);
        bridge
    }

    /// Point the bridge at a new data object.
    ///
    /// Only a weak reference is kept. Change tracking restarts from scratch.
    pub fn set_input<D: DataObject + 'static>(&mut self, input: &Rc<RefCell<D>>) {
        let shared: Rc<RefCell<dyn DataObject>> = input.clone();
        self.input = Some(Rc::downgrade(&shared));
        self.last_pipeline_mtime = 0;
        self.realized_mtime = 0;
        self.state = BridgeState::Idle;
        log::debug!("Bridge {} input set", self.handle);
    }

    /// Forget the input
    pub fn clear_input(&mut self) {
        self.input = None;
        self.state = BridgeState::Idle;
    }

    /// The input, if it is set and still alive
    pub fn input(&self) -> Option<Rc<RefCell<dyn DataObject>>> {
        self.input.as_ref().and_then(Weak::upgrade)
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle
    }

    /// Opaque value identifying this bridge to the foreign system.
    ///
    /// Stable for the bridge's lifetime.
    pub fn callback_user_data(&self) -> *mut c_void {
        self.handle.as_ptr()
    }

    /// Run the metadata-only negotiation pass through the pipeline
    pub fn update_information(&mut self) -> Result<()> {
        self.with_input_mut(|input| input.update_output_information())??;
        if self.state == BridgeState::Idle {
            self.transition(BridgeState::MetadataValid);
        }
        Ok(())
    }

    /// Report whether the pipeline changed since the last time this returned true.
    ///
    /// This is single-shot: a `true` result advances the shadow time, so an
    /// immediate repeat returns `false` whether or not the caller acted on the
    /// first answer.
    pub fn pipeline_modified(&mut self) -> bool {
        let current = match self.read_input(|input| input.pipeline_mtime()) {
            Ok(mtime) => mtime,
            Err(e) => {
                log::warn!("Bridge {}: pipeline modified check without input: {}", self.handle, e);
                return false;
            }
        };

        if current > self.last_pipeline_mtime {
            log::debug!(
                "Bridge {}: pipeline modified ({} -> {})",
                self.handle,
                self.last_pipeline_mtime,
                current
            );
            self.last_pipeline_mtime = current;
            self.transition(BridgeState::Dirty);
            true
        } else {
            false
        }
    }

    /// Full logical extent of the input
    pub fn whole_extent(&self) -> Result<Extent> {
        self.read_input(|input| input.whole_extent())
    }

    /// Extent of the region currently realized in the buffer
    pub fn data_extent(&self) -> Result<Extent> {
        self.read_input(|input| input.buffered_extent())
    }

    pub fn spacing(&self) -> Result<Vector3> {
        self.read_input(|input| input.spacing())
    }

    pub fn origin(&self) -> Result<Vector3> {
        self.read_input(|input| input.origin())
    }

    pub fn scalar_type(&self) -> Result<ScalarType> {
        self.read_input(|input| input.scalar_type())
    }

    pub fn number_of_components(&self) -> Result<usize> {
        self.read_input(|input| input.number_of_components())
    }

    /// Ask the pipeline to realize only `extent` on the next
    /// [`ExportBridge::update_data`]
    pub fn propagate_update_extent(&mut self, extent: Extent) -> Result<()> {
        log::debug!("Bridge {}: propagating update extent {}", self.handle, extent);
        self.with_input_mut(|input| input.set_requested_extent(extent))
    }

    /// Realize the buffer for the requested region.
    ///
    /// Fires [`ExportEvent::Start`], updates the input (which may recompute
    /// upstream and block for a long time), then fires [`ExportEvent::End`].
    /// On failure the error is returned and no End event is fired.
    pub fn update_data(&mut self) -> Result<()> {
        let input = self.input().ok_or(ExportError::NoInput)?;

        self.notifier.invoke(ExportEvent::Start);
        {
            let mut object = input.try_borrow_mut().map_err(|_| ExportError::InputBusy)?;
            object.update()?;
            self.realized_mtime = object.pipeline_mtime();
        }
        self.transition(BridgeState::DataValid);
        self.notifier.invoke(ExportEvent::End);

        log::debug!("Bridge {}: data realized", self.handle);
        Ok(())
    }

    /// Pointer to the realized buffer, or null if nothing is realized.
    ///
    /// The pointer stays valid until the next data realization or upstream
    /// modification. Read only, and only within [`ExportBridge::data_extent`].
    pub fn buffer_pointer(&self) -> Result<*const c_void> {
        self.read_input(|input| {
            let buffer = input.buffer();
            if buffer.is_empty() {
                std::ptr::null()
            } else {
                buffer.as_ptr() as *const c_void
            }
        })
    }

    /// Borrow the realized buffer without copying
    pub fn with_buffer<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.read_input(|input| f(input.buffer()))
    }

    /// Current state of the export round.
    ///
    /// `DataValid` turns into `Dirty` as soon as the input's pipeline time
    /// moves past the time at which data was realized.
    pub fn state(&self) -> BridgeState {
        if self.state == BridgeState::DataValid {
            if let Ok(current) = self.read_input(|input| input.pipeline_mtime()) {
                if current > self.realized_mtime {
                    return BridgeState::Dirty;
                }
            }
        }
        self.state
    }

    /// Shadow modification time used by [`ExportBridge::pipeline_modified`]
    pub fn last_pipeline_mtime(&self) -> u64 {
        self.last_pipeline_mtime
    }

    pub fn add_observer<F>(&mut self, event: ExportEvent, callback: F) -> ObserverTag
    where
        F: FnMut(ExportEvent) + 'static,
    {
        self.notifier.add_observer(event, callback)
    }

    pub fn add_any_observer<F>(&mut self, callback: F) -> ObserverTag
    where
        F: FnMut(ExportEvent) + 'static,
    {
        self.notifier.add_any_observer(callback)
    }

    pub fn remove_observer(&mut self, tag: ObserverTag) -> bool {
        self.notifier.remove_observer(tag)
    }

    /// Last failure reported through the callback table, which has no
    /// error channel of its own
    pub fn last_error(&self) -> Option<&ExportError> {
        self.last_error.as_ref()
    }

    pub fn take_last_error(&mut self) -> Option<ExportError> {
        self.last_error.take()
    }

    pub(crate) fn record_error(&mut self, error: ExportError) {
        self.last_error = Some(error);
    }

    /// Write a human-readable dump of the bridge state
    pub fn describe(&self, out: &mut dyn fmt::Write, indent: Indent) -> fmt::Result {
        writeln!(out, "{}ExportBridge {}", indent, self.handle)?;
        let indent = indent.next();
        writeln!(out, "{}State: {}", indent, self.state())?;
        writeln!(out, "{}Last Pipeline MTime: {}", indent, self.last_pipeline_mtime)?;
        writeln!(out, "{}Input: {}", indent, if self.input().is_some() { "set" } else { "(none)" })?;
        writeln!(out, "{}Observers: {}", indent, self.notifier.len())?;
        if let Some(error) = &self.last_error {
            writeln!(out, "{}Last Error: {}", indent, error)?;
        }
        Ok(())
    }

    fn transition(&mut self, next: BridgeState) {
        if self.state != next {
            log::trace!("Bridge {}: {} -> {}", self.handle, self.state, next);
            self.state = next;
        }
    }

    fn read_input<R>(&self, f: impl FnOnce(&dyn DataObject) -> R) -> Result<R> {
        let input = self.input().ok_or(ExportError::NoInput)?;
        let object = input.try_borrow().map_err(|_| ExportError::InputBusy)?;
        Ok(f(&*object))
    }

    fn with_input_mut<R>(&self, f: impl FnOnce(&mut dyn DataObject) -> R) -> Result<R> {
        let input = self.input().ok_or(ExportError::NoInput)?;
        let mut object = input.try_borrow_mut().map_err(|_| ExportError::InputBusy)?;
        Ok(f(&mut *object))
    }
}

impl Default for ExportBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExportBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportBridge")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("last_pipeline_mtime", &self.last_pipeline_mtime)
            .field("has_input", &self.input().is_some())
            .finish()
    }
}

impl fmt::Display for ExportBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.describe(f, Indent::default())
    }
}
