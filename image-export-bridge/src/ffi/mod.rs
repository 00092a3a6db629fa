//! C ABI surface of the export bridge
//!
//! This module contains the callback table handed to foreign consumers and the
//! registry that maps their opaque user-data pointer back to a bridge.

pub mod callbacks;
pub mod registry;

// Re-export FFI types
pub use callbacks::{
    BufferPointerCallback, CallbackTable, DataExtentCallback, ExportSession,
    NumberOfComponentsCallback, OriginCallback, PipelineModifiedCallback,
    PropagateUpdateExtentCallback, ScalarTypeCallback, SpacingCallback,
    UpdateDataCallback, UpdateInformationCallback, WholeExtentCallback,
};
pub use registry::{registered_count, BridgeHandle};
