//! Consumer side of the callback table
//!
//! [`TableImporter`] calls a [`CallbackTable`] the same way a foreign pipeline
//! would and copies what it receives into owned Rust values. The CLI uses it
//! to pull exported images back, and tests use it to exercise the C surface.

use crate::buffer::ScalarBuffer;
use crate::ffi::CallbackTable;
use crate::types::{Extent, ExportError, Result, ScalarType, Vector3, DIMENSIONS};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::ffi::CStr;
use std::os::raw::{c_double, c_int};

/// Metadata negotiated through the table before any data moves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub whole_extent: Extent,
    pub spacing: Vector3,
    pub origin: Vector3,
    pub scalar_type: ScalarType,
    pub number_of_components: usize,
}

/// An image region copied out of the exported buffer
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedImage {
    pub metadata: ImageMetadata,
    /// Region actually held in `scalars`
    pub data_extent: Extent,
    pub scalars: ScalarBuffer,
}

impl ImportedImage {
    /// Value of `component` at the structured `index`, if inside the data extent
    pub fn value_at(&self, index: [i32; DIMENSIONS], component: usize) -> Option<f64> {
        let components = self.metadata.number_of_components;
        if component >= components {
            return None;
        }
        let point = self.data_extent.offset_of(index)?;
        self.scalars.get(point * components + component)
    }

    /// Smallest and largest value over all components
    pub fn scalar_range(&self) -> Option<(f64, f64)> {
        self.scalars.range()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.scalars.as_bytes()
    }

    pub fn number_of_points(&self) -> usize {
        self.data_extent.number_of_points()
    }
}

/// Drives a callback table like a foreign consumer
#[derive(Debug, Clone)]
pub struct TableImporter<'a> {
    table: &'a CallbackTable,
    /// Last region passed to PropagateUpdateExtent; pulls must cover it
    requested: Cell<Option<Extent>>,
}

impl<'a> TableImporter<'a> {
    pub fn new(table: &'a CallbackTable) -> Self {
        Self {
            table,
            requested: Cell::new(None),
        }
    }

    pub fn update_information(&self) {
        (self.table.update_information)(self.table.callback_user_data);
    }

    /// Ask the exporter whether the pipeline changed. Single-shot: a `true`
    /// answer is not repeated, so act on it.
    pub fn pipeline_modified(&self) -> bool {
        (self.table.pipeline_modified)(self.table.callback_user_data) != 0
    }

    /// Copy all metadata out of the table
    pub fn metadata(&self) -> Result<ImageMetadata> {
        let ud = self.table.callback_user_data;

        let whole_extent = read_extent("WholeExtent", (self.table.whole_extent)(ud))?;
        let spacing = read_vector("Spacing", (self.table.spacing)(ud))?;
        let origin = read_vector("Origin", (self.table.origin)(ud))?;

        let name = (self.table.scalar_type)(ud);
        if name.is_null() {
            return Err(ExportError::NullPointer("ScalarType"));
        }
        // SAFETY: non-null ScalarType results are static NUL-terminated strings.
        let name = unsafe { CStr::from_ptr(name) }.to_string_lossy();
        let scalar_type: ScalarType = name.parse()?;

        let components = (self.table.number_of_components)(ud);
        if components < 1 {
            return Err(ExportError::Pipeline(format!(
                "exporter reported {} components",
                components
            )));
        }

        Ok(ImageMetadata {
            whole_extent,
            spacing,
            origin,
            scalar_type,
            number_of_components: components as usize,
        })
    }

    /// Restrict the next pull to `extent`
    pub fn propagate_update_extent(&self, extent: Extent) {
        let bounds = extent.as_array();
        (self.table.propagate_update_extent)(self.table.callback_user_data, bounds.as_ptr());
        self.requested.set(Some(extent));
    }

    /// Realize the data and copy the buffered region out
    pub fn pull(&self) -> Result<ImportedImage> {
        let ud = self.table.callback_user_data;
        let metadata = self.metadata()?;

        (self.table.update_data)(ud);

        let data_extent = read_extent("DataExtent", (self.table.data_extent)(ud))?;
        if data_extent.is_empty() {
            return Err(ExportError::Pipeline("UpdateData realized no data".to_string()));
        }
        let requested = self.requested.get().unwrap_or(metadata.whole_extent);
        if !data_extent.contains(&requested) {
            return Err(ExportError::Pipeline(format!(
                "UpdateData realized {} which does not cover the requested {}",
                data_extent, requested
            )));
        }

        let expected = data_extent
            .checked_number_of_points()
            .and_then(|n| n.checked_mul(metadata.number_of_components))
            .and_then(|n| n.checked_mul(metadata.scalar_type.size_in_bytes()))
            .ok_or_else(|| {
                ExportError::InvalidExtent(format!("byte count of {} overflows", data_extent))
            })?;

        let pointer = (self.table.buffer_pointer)(ud);
        if pointer.is_null() {
            return Err(ExportError::NullPointer("BufferPointer"));
        }
        // SAFETY: the exporter guarantees the buffer covers DataExtent with the
        // advertised scalar type and component count until the next update.
        let bytes = unsafe { std::slice::from_raw_parts(pointer as *const u8, expected) };
        let scalars = ScalarBuffer::from_bytes(metadata.scalar_type, bytes)?;

        log::debug!("Pulled {} bytes for extent {}", expected, data_extent);
        Ok(ImportedImage {
            metadata,
            data_extent,
            scalars,
        })
    }

    /// Pull only if the pipeline changed since the last check.
    ///
    /// The flag is read once and acted on immediately.
    pub fn pull_if_modified(&self) -> Result<Option<ImportedImage>> {
        if self.pipeline_modified() {
            self.pull().map(Some)
        } else {
            Ok(None)
        }
    }
}

fn read_extent(slot: &'static str, pointer: *const c_int) -> Result<Extent> {
    if pointer.is_null() {
        return Err(ExportError::NullPointer(slot));
    }
    // SAFETY: extent slots return six readable ints.
    let bounds = unsafe { std::slice::from_raw_parts(pointer, 2 * DIMENSIONS) };
    Extent::from_slice(bounds).ok_or_else(|| ExportError::InvalidExtent(format!("{:?}", bounds)))
}

fn read_vector(slot: &'static str, pointer: *const c_double) -> Result<Vector3> {
    if pointer.is_null() {
        return Err(ExportError::NullPointer(slot));
    }
    // SAFETY: spacing and origin slots return three readable doubles.
    let values = unsafe { std::slice::from_raw_parts(pointer, DIMENSIONS) };
    Ok([values[0], values[1], values[2]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Pattern, SourceConfig};
    use crate::ffi::ExportSession;
    use crate::source::GeneratedImage;

    fn ramp_image() -> std::rc::Rc<std::cell::RefCell<GeneratedImage>> {
        GeneratedImage::new(
            SourceConfig::new()
                .with_scalar_type(ScalarType::Short)
                .with_whole_extent(Extent::new([0, 3, 0, 2, 0, 1]))
                .with_spacing([0.5, 0.5, 2.0])
                .with_components(2)
                .with_pattern(Pattern::Ramp { scale: 10.0 }),
        )
        .unwrap()
        .into_shared()
    }

    #[test]
    fn test_metadata_round_trip() {
        let image = ramp_image();
        let session = ExportSession::for_input(&image);
        let importer = TableImporter::new(session.table());

        importer.update_information();
        let metadata = importer.metadata().unwrap();
        assert_eq!(metadata.whole_extent, Extent::new([0, 3, 0, 2, 0, 1]));
        assert_eq!(metadata.spacing, [0.5, 0.5, 2.0]);
        assert_eq!(metadata.origin, [0.0; 3]);
        assert_eq!(metadata.scalar_type, ScalarType::Short);
        assert_eq!(metadata.number_of_components, 2);
    }

    #[test]
    fn test_pull_whole_image() {
        let image = ramp_image();
        let session = ExportSession::for_input(&image);
        let importer = TableImporter::new(session.table());

        let pulled = importer.pull().unwrap();
        assert_eq!(pulled.data_extent, Extent::new([0, 3, 0, 2, 0, 1]));
        assert_eq!(pulled.number_of_points(), 24);
        assert_eq!(pulled.as_bytes().len(), 24 * 2 * 2);

        // ramp: 10 * (x + y + z) + component
        assert_eq!(pulled.value_at([1, 2, 1], 0), Some(40.0));
        assert_eq!(pulled.value_at([1, 2, 1], 1), Some(41.0));
        assert_eq!(pulled.value_at([4, 0, 0], 0), None);
        assert_eq!(pulled.value_at([0, 0, 0], 2), None);
        assert_eq!(pulled.scalar_range(), Some((0.0, 61.0)));
    }

    #[test]
    fn test_pull_sub_extent() {
        let image = ramp_image();
        let session = ExportSession::for_input(&image);
        let importer = TableImporter::new(session.table());

        let region = Extent::new([1, 2, 1, 1, 0, 0]);
        importer.propagate_update_extent(region);
        let pulled = importer.pull().unwrap();

        assert!(pulled.data_extent.contains(&region));
        assert_eq!(pulled.value_at([2, 1, 0], 0), Some(30.0));
    }

    #[test]
    fn test_pull_if_modified_is_single_shot() {
        let image = ramp_image();
        let session = ExportSession::for_input(&image);
        let importer = TableImporter::new(session.table());

        assert!(importer.pull_if_modified().unwrap().is_some());
        assert!(importer.pull_if_modified().unwrap().is_none());

        image.borrow_mut().set_pattern(Pattern::Constant { value: 7.0 });
        let pulled = importer.pull_if_modified().unwrap().unwrap();
        assert_eq!(pulled.scalar_range(), Some((7.0, 7.0)));
    }

    #[test]
    fn test_pull_fails_when_request_is_not_covered() {
        let image = ramp_image();
        let session = ExportSession::for_input(&image);
        let importer = TableImporter::new(session.table());

        importer.pull().unwrap();
        importer.propagate_update_extent(Extent::new([0, 9, 0, 0, 0, 0]));
        assert!(matches!(importer.pull(), Err(ExportError::Pipeline(_))));
    }

    #[test]
    fn test_pull_without_input_fails() {
        let image = ramp_image();
        let session = ExportSession::for_input(&image);
        drop(image);

        let importer = TableImporter::new(session.table());
        assert_eq!(importer.metadata(), Err(ExportError::NullPointer("ScalarType")));
    }
}
