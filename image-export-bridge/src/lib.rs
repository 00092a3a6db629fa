//! Image Export Bridge Library
//!
//! Exposes an image data object of an internal processing pipeline to a
//! foreign pipeline through a fixed table of C function pointers, so the
//! foreign side can negotiate metadata, request a region and read the pixel
//! buffer in place.
//!
//! # Architecture
//!
//! - [`DataObject`] is what the internal pipeline implements; the bridge only
//!   holds a weak reference to it
//! - [`ExportBridge`] answers every callback in safe Rust and tracks whether
//!   the pipeline changed since the consumer last looked
//! - [`ExportSession`] registers a bridge and hands out its [`CallbackTable`];
//!   the table's user data is an opaque handle, never a raw object pointer
//! - [`TableImporter`] is the consumer side, driving a table like a foreign
//!   pipeline would
//!
//! The library does NOT:
//! - Copy data on export (the buffer pointer aliases the realized region)
//! - Share bridges between threads
//! - Know anything about the foreign pipeline's types
//!
//! # Example Usage
//!
//! ```no_run
//! use image_export_bridge::{
//!     Extent, ExportEvent, ExportSession, GeneratedImage, ScalarType, SourceConfig,
//!     TableImporter,
//! };
//!
//! // Create a pipeline source
//! let config = SourceConfig::new()
//!     .with_scalar_type(ScalarType::UnsignedChar)
//!     .with_whole_extent(Extent::new([0, 255, 0, 255, 0, 0]));
//! let image = GeneratedImage::new(config).unwrap().into_shared();
//!
//! // Export it
//! let session = ExportSession::for_input(&image);
//! session
//!     .bridge_mut()
//!     .add_observer(ExportEvent::End, |_| println!("data realized"));
//!
//! // Hand `session.table()` to a foreign consumer, or pull it back directly
//! let importer = TableImporter::new(session.table());
//! importer.update_information();
//! if let Some(pulled) = importer.pull_if_modified().unwrap() {
//!     println!("Pulled {} bytes", pulled.as_bytes().len());
//! }
//! ```

// Public modules
pub mod bridge;
pub mod buffer;
pub mod config;
pub mod data_object;
pub mod events;
pub mod ffi;
pub mod import;
pub mod source;
pub mod types;
pub mod util;

// Re-export main types for convenience
pub use bridge::{BridgeState, ExportBridge};
pub use buffer::ScalarBuffer;
pub use config::{Pattern, SourceConfig};
pub use data_object::{DataObject, TimeStamp};
pub use events::{EventNotifier, ExportEvent, ObserverTag};
pub use ffi::{BridgeHandle, CallbackTable, ExportSession};
pub use import::{ImageMetadata, ImportedImage, TableImporter};
pub use source::GeneratedImage;
pub use types::{Extent, ExportError, Result, ScalarType, Vector3, DIMENSIONS};
pub use util::{make_directory, Indent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
