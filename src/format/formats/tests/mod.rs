//! On-disk tests for the built-in codecs.
//!
//! Each test writes a file through a codec (or by hand), reads it back and
//! checks geometry, pixel values and header passthrough.

mod metaimage_tests;
mod npy_tests;
mod vff_tests;
mod vtk_tests;

use crate::image::{PixelBuffer, PixelData};

/// 3x2x2 signed ramp with anisotropic spacing.
fn ramp_volume() -> PixelBuffer {
    PixelBuffer::new([3, 2, 2], 1, PixelData::I16((-5..7).collect()))
        .unwrap()
        .with_spacing([0.5, 0.75, 2.0])
        .with_origin([1.0, -1.5, 10.0])
}
