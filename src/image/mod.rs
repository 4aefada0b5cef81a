//! Pixel buffers and the image wrapper that carries their header.
//!
//! ## Header lifecycle
//!
//! An [`Image`] starts without a header. The first header access asks the
//! configured [`crate::header::HeaderDefaults`] for a base record, then
//! derives bit depth, size, pixel range and (when rescale tags exist) a
//! percentile window from the pixel data, and numbers each z-slice. The
//! result is cached against the buffer's modification stamp.

mod buffer;
mod dimension;
mod error;
mod stats;
mod synthesis;
mod wrapper;

pub use buffer::{
    BufferDescriptor, ByteOrder, PixelBuffer, PixelData, ScalarType, SharedBuffer, WeakBuffer,
};
pub use dimension::{Dimension, DimensionKind, default_dimensions};
pub use error::ImageError;
pub use stats::{percentile_range, window_from_range};
pub use wrapper::Image;
