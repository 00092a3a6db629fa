//! The consumed interface of the upstream pipeline
//!
//! The bridge never computes image data itself. It talks to a [`DataObject`],
//! which owns the realized buffer, the image metadata and a modification time.
//! Everything behind this trait (how data gets computed, how stale inputs are
//! detected upstream) belongs to the pipeline, not to the bridge.

use crate::types::{Extent, Result, ScalarType, Vector3};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide modification clock. Every tick is strictly larger than the last.
static MODIFICATION_CLOCK: AtomicU64 = AtomicU64::new(0);

/// A point on the process-wide modification clock
///
/// The default value (zero) is older than every stamp ever handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeStamp(u64);

impl TimeStamp {
    /// Take a fresh stamp, newer than any taken before
    pub fn tick() -> Self {
        Self(MODIFICATION_CLOCK.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Move this stamp to a fresh tick
    pub fn modified(&mut self) {
        *self = Self::tick();
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Array data produced by the internal pipeline
///
/// Implementations are owned and mutated exclusively by the pipeline. The
/// bridge only holds a weak back-reference and calls into this trait.
pub trait DataObject {
    /// Modification time of this object and everything upstream of it.
    ///
    /// Never decreases.
    fn pipeline_mtime(&self) -> u64;

    /// Metadata-only negotiation pass. May refresh extents, spacing and origin;
    /// never moves bulk data.
    fn update_output_information(&mut self) -> Result<()>;

    /// Narrow the region the next [`DataObject::update`] has to realize
    fn set_requested_extent(&mut self, extent: Extent);

    /// Realize the buffer for the requested region, recomputing upstream
    /// stages if they are stale. May block for a long time.
    fn update(&mut self) -> Result<()>;

    /// Full logical index-space bounds
    fn whole_extent(&self) -> Extent;

    /// Bounds of the region currently held in [`DataObject::buffer`]
    fn buffered_extent(&self) -> Extent;

    fn spacing(&self) -> Vector3;

    fn origin(&self) -> Vector3;

    fn scalar_type(&self) -> ScalarType;

    /// Components per point, at least 1
    fn number_of_components(&self) -> usize;

    /// Raw bytes of the buffered region: x varies fastest, components are
    /// interleaved per point.
    fn buffer(&self) -> &[u8];
}
