//! Error types for image operations.

use thiserror::Error;

use crate::header::TagConversionError;

/// Errors raised by [`crate::image::Image`] and pixel buffers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// The observed upstream buffer no longer exists
    #[error("Upstream pixel buffer has been released")]
    ProducerDropped,

    /// Slice index past the image depth
    #[error("Slice {index} out of range for depth {depth}")]
    SliceOutOfRange {
        /// Requested slice
        index: usize,
        /// Number of slices
        depth: usize,
    },

    /// Pixel data length does not match the declared shape
    #[error("Pixel data has {actual} values, shape needs {expected}")]
    ShapeMismatch {
        /// Values required by the shape
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// A header element could not be stored
    #[error(transparent)]
    Tag(#[from] TagConversionError),
}
