//! Reference pipeline source
//!
//! `GeneratedImage` is a minimal demand-driven source: it remembers when it
//! was last modified and when its buffer was last realized, and only
//! regenerates data when one of those says the buffer is stale or the
//! requested region is not already buffered.

use crate::buffer::ScalarBuffer;
use crate::config::{Pattern, SourceConfig};
use crate::data_object::{DataObject, TimeStamp};
use crate::types::{Extent, ExportError, Result, ScalarType, Vector3};
use std::cell::RefCell;
use std::rc::Rc;

/// An in-memory image source filled from a [`Pattern`]
#[derive(Debug)]
pub struct GeneratedImage {
    config: SourceConfig,
    /// Bumped by every setter
    mtime: TimeStamp,
    /// Taken each time the buffer is regenerated
    data_time: TimeStamp,
    requested_extent: Option<Extent>,
    buffered_extent: Extent,
    buffer: ScalarBuffer,
    generation_count: usize,
    information_count: usize,
}

impl GeneratedImage {
    /// Create a source from a validated configuration
    pub fn new(config: SourceConfig) -> Result<Self> {
        config.validate()?;
        let buffer = ScalarBuffer::empty(config.scalar_type);
        Ok(Self {
            config,
            mtime: TimeStamp::tick(),
            data_time: TimeStamp::default(),
            requested_extent: None,
            buffered_extent: Extent::empty(),
            buffer,
            generation_count: 0,
            information_count: 0,
        })
    }

    /// Wrap the source for sharing with an export bridge
    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Mark the source as changed so the next update regenerates
    pub fn modified(&mut self) {
        self.mtime.modified();
        log::trace!("Source modified at t={}", self.mtime.value());
    }

    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.config.pattern = pattern;
        self.modified();
    }

    pub fn set_spacing(&mut self, spacing: Vector3) {
        self.config.spacing = spacing;
        self.modified();
    }

    pub fn set_origin(&mut self, origin: Vector3) {
        self.config.origin = origin;
        self.modified();
    }

    /// Change the whole extent. Any narrowed request is dropped.
    pub fn set_whole_extent(&mut self, extent: Extent) -> Result<()> {
        if extent.is_empty() {
            return Err(ExportError::InvalidConfig(format!(
                "whole extent {} is empty",
                extent
            )));
        }
        self.config.whole_extent = extent;
        self.requested_extent = None;
        self.modified();
        Ok(())
    }

    /// Region the next update will realize
    pub fn requested_extent(&self) -> Extent {
        self.requested_extent.unwrap_or(self.config.whole_extent)
    }

    /// How many times the buffer has been regenerated
    pub fn generation_count(&self) -> usize {
        self.generation_count
    }

    /// How many metadata-only passes have run
    pub fn information_count(&self) -> usize {
        self.information_count
    }

    /// Drop the realized buffer so a failed update never leaves stale data
    fn release_data(&mut self) {
        self.buffer = ScalarBuffer::empty(self.config.scalar_type);
        self.buffered_extent = Extent::empty();
    }

    fn is_up_to_date(&self, requested: &Extent) -> bool {
        self.data_time > self.mtime
            && !self.buffered_extent.is_empty()
            && self.buffered_extent.contains(requested)
    }

    fn generate(&mut self, region: Extent) {
        let components = self.config.components;
        let pattern = &self.config.pattern;
        let len = region.number_of_points() * components;

        log::debug!(
            "Generating {} {} scalars for region {}",
            len,
            self.config.scalar_type,
            region
        );

        self.buffer = ScalarBuffer::from_fn(self.config.scalar_type, len, |i| {
            pattern.sample(region.index_at(i / components), i % components)
        });
        self.buffered_extent = region;
        self.data_time = TimeStamp::tick();
        self.generation_count += 1;
    }
}

impl DataObject for GeneratedImage {
    fn pipeline_mtime(&self) -> u64 {
        self.mtime.value()
    }

    fn update_output_information(&mut self) -> Result<()> {
        self.information_count += 1;
        log::trace!("Output information: whole extent {}", self.config.whole_extent);
        Ok(())
    }

    fn set_requested_extent(&mut self, extent: Extent) {
        log::debug!("Requested extent set to {}", extent);
        self.requested_extent = Some(extent);
    }

    fn update(&mut self) -> Result<()> {
        let whole = self.config.whole_extent;
        let requested = self.requested_extent();

        if requested.is_empty() || !whole.contains(&requested) {
            self.release_data();
            return Err(ExportError::InvalidRequestedExtent { requested, whole });
        }

        if self.is_up_to_date(&requested) {
            log::debug!("Buffer for {} is up to date, skipping generation", requested);
            return Ok(());
        }

        self.generate(requested);
        Ok(())
    }

    fn whole_extent(&self) -> Extent {
        self.config.whole_extent
    }

    fn buffered_extent(&self) -> Extent {
        self.buffered_extent
    }

    fn spacing(&self) -> Vector3 {
        self.config.spacing
    }

    fn origin(&self) -> Vector3 {
        self.config.origin
    }

    fn scalar_type(&self) -> ScalarType {
        self.config.scalar_type
    }

    fn number_of_components(&self) -> usize {
        self.config.components
    }

    fn buffer(&self) -> &[u8] {
        self.buffer.as_bytes()
    }
}
