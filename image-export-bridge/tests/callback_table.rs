// Integration tests driving the bridge only through its C callback table

use image_export_bridge::{
    make_directory, BridgeHandle, CallbackTable, DataObject, Extent, ExportBridge, ExportError,
    ExportSession, GeneratedImage, Pattern, ScalarType, SourceConfig, TableImporter, Vector3,
};
use std::cell::RefCell;
use std::ffi::CStr;
use std::os::raw::c_int;
use std::rc::Rc;

/// Data object whose modification time is set by hand
struct ManualObject {
    mtime: u64,
    extent: Extent,
    buffer: Vec<f32>,
}

impl ManualObject {
    fn new(mtime: u64) -> Self {
        Self {
            mtime,
            extent: Extent::new([0, 1, 0, 1, 0, 0]),
            buffer: Vec::new(),
        }
    }
}

impl DataObject for ManualObject {
    fn pipeline_mtime(&self) -> u64 {
        self.mtime
    }

    fn update_output_information(&mut self) -> image_export_bridge::Result<()> {
        Ok(())
    }

    fn set_requested_extent(&mut self, _extent: Extent) {}

    fn update(&mut self) -> image_export_bridge::Result<()> {
        self.buffer = vec![self.mtime as f32; self.extent.number_of_points()];
        Ok(())
    }

    fn whole_extent(&self) -> Extent {
        self.extent
    }

    fn buffered_extent(&self) -> Extent {
        if self.buffer.is_empty() {
            Extent::empty()
        } else {
            self.extent
        }
    }

    fn spacing(&self) -> Vector3 {
        [1.0; 3]
    }

    fn origin(&self) -> Vector3 {
        [0.0; 3]
    }

    fn scalar_type(&self) -> ScalarType {
        ScalarType::Float
    }

    fn number_of_components(&self) -> usize {
        1
    }

    fn buffer(&self) -> &[u8] {
        bytemuck::cast_slice(&self.buffer)
    }
}

fn read_extent(ptr: *const c_int) -> [c_int; 6] {
    assert!(!ptr.is_null());
    let mut out = [0; 6];
    out.copy_from_slice(unsafe { std::slice::from_raw_parts(ptr, 6) });
    out
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn checker_image() -> Rc<RefCell<GeneratedImage>> {
    init_logging();
    GeneratedImage::new(
        SourceConfig::new()
            .with_scalar_type(ScalarType::UnsignedChar)
            .with_whole_extent(Extent::new([0, 15, 0, 15, 0, 0]))
            .with_pattern(Pattern::Checkerboard {
                square: 4,
                low: 0.0,
                high: 255.0,
            }),
    )
    .unwrap()
    .into_shared()
}

#[test]
fn pipeline_modified_reports_each_change_once() {
    init_logging();
    let object = Rc::new(RefCell::new(ManualObject::new(5)));
    let session = ExportSession::for_input(&object);
    let table = session.table();
    let ud = table.callback_user_data;

    // Prime the shadow time at 5
    assert_eq!((table.pipeline_modified)(ud), 1);
    assert_eq!(session.bridge().last_pipeline_mtime(), 5);

    let mut answers = Vec::new();
    for mtime in [5, 5, 7, 7, 9] {
        object.borrow_mut().mtime = mtime;
        answers.push((table.pipeline_modified)(ud) != 0);
    }
    assert_eq!(answers, vec![false, false, true, false, true]);
    assert_eq!(session.bridge().last_pipeline_mtime(), 9);
}

#[test]
fn buffer_covers_data_extent() {
    let image = checker_image();
    let session = ExportSession::for_input(&image);
    let table = session.table();
    let ud = table.callback_user_data;

    (table.update_information)(ud);
    (table.update_data)(ud);

    let extent = Extent::from_slice(&read_extent((table.data_extent)(ud))).unwrap();
    assert_eq!(extent, Extent::new([0, 15, 0, 15, 0, 0]));

    let ptr = (table.buffer_pointer)(ud) as *const u8;
    assert!(!ptr.is_null());
    let bytes = unsafe { std::slice::from_raw_parts(ptr, extent.number_of_points()) };
    assert_eq!(bytes[0], 255);
    assert_eq!(bytes[4], 0);
    assert_eq!(bytes[4 * 16 + 4], 255);
}

#[test]
fn propagated_extent_is_realized() {
    let image = checker_image();
    let session = ExportSession::for_input(&image);
    let importer = TableImporter::new(session.table());

    let region = Extent::new([4, 11, 2, 3, 0, 0]);
    importer.update_information();
    importer.propagate_update_extent(region);
    let pulled = importer.pull().unwrap();

    assert!(pulled.data_extent.contains(&region));
    assert_eq!(pulled.value_at([4, 2, 0], 0), Some(0.0));
    assert_eq!(pulled.value_at([8, 2, 0], 0), Some(255.0));
}

#[test]
fn scalar_type_and_components_are_stable() {
    let image = checker_image();
    let session = ExportSession::for_input(&image);
    let table = session.table();
    let ud = table.callback_user_data;

    let first = (table.scalar_type)(ud);
    for _ in 0..3 {
        (table.update_data)(ud);
        assert_eq!((table.scalar_type)(ud), first);
        assert_eq!((table.number_of_components)(ud), 1);
    }
    assert_eq!(unsafe { CStr::from_ptr(first) }.to_str().unwrap(), "unsigned char");
}

#[test]
fn stale_and_null_handles_are_harmless() {
    let image = checker_image();
    let table: CallbackTable = *ExportSession::for_input(&image).table();
    let ud = table.callback_user_data;

    assert_eq!((table.pipeline_modified)(ud), 0);
    assert_eq!(read_extent((table.whole_extent)(ud)), [0, -1, 0, -1, 0, -1]);
    assert_eq!((table.number_of_components)(ud), 0);
    assert!((table.buffer_pointer)(ud).is_null());
    (table.update_information)(ud);
    (table.update_data)(ud);
    assert_eq!(image.borrow().generation_count(), 0);

    assert!((table.scalar_type)(std::ptr::null_mut()).is_null());
    assert!(BridgeHandle::from_ptr(ud).is_some());
}

#[test]
fn failed_update_is_reported_through_last_error() {
    let image = checker_image();
    let session = ExportSession::for_input(&image);
    let importer = TableImporter::new(session.table());

    importer.propagate_update_extent(Extent::new([10, 20, 0, 0, 0, 0]));
    assert!(importer.pull().is_err());

    let error = session.bridge_mut().take_last_error();
    assert!(matches!(error, Some(ExportError::InvalidRequestedExtent { .. })));
    assert!(session.bridge().last_error().is_none());
}

#[test]
fn failed_update_after_successful_pull_exposes_no_stale_data() {
    let image = checker_image();
    let session = ExportSession::for_input(&image);
    let table = session.table();
    let importer = TableImporter::new(table);

    importer.update_information();
    importer.pull().unwrap();

    importer.propagate_update_extent(Extent::new([10, 20, 0, 0, 0, 0]));
    assert!(importer.pull().is_err());
    assert!(matches!(
        session.bridge().last_error(),
        Some(ExportError::InvalidRequestedExtent { .. })
    ));
    assert_eq!(
        read_extent((table.data_extent)(table.callback_user_data)),
        [0, -1, 0, -1, 0, -1]
    );
    assert!((table.buffer_pointer)(table.callback_user_data).is_null());
}

#[test]
fn sessions_on_one_thread_are_independent() {
    let first = checker_image();
    let second = checker_image();
    let a = ExportSession::for_input(&first);
    let b = ExportSession::new(ExportBridge::with_input(&second));
    assert_ne!(a.handle(), b.handle());

    second.borrow_mut().set_pattern(Pattern::Constant { value: 1.0 });
    TableImporter::new(a.table()).pull().unwrap();

    assert_eq!(first.borrow().generation_count(), 1);
    assert_eq!(second.borrow().generation_count(), 0);
}

#[test]
fn make_directory_for_export_output() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("exports").join("run-1");
    assert!(make_directory(out.to_str().unwrap()));
    assert!(out.is_dir());
}
