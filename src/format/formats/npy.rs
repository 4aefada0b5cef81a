//! NumPy `.npy` codec.
//!
//! Arrays are laid out C-order with the x axis fastest:
//! - 2D: `(height, width)`
//! - 3D: `(depth, height, width)`
//! - 4D: `(depth, height, width, components)`
//!
//! Header keywords are kept in a companion `key = value` file since the
//! array format has no room for them.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};

use crate::format::error::FormatError;
use crate::format::magic::Magic;
use crate::format::progress::Progress;
use crate::format::sidecar;
use crate::format::traits::{
    Capabilities, DecodedImage, EncodeHeader, FormatDescriptor, FormatReader, FormatWriter,
    HeaderStyle,
};
use crate::image::{PixelBuffer, PixelData};

/// NumPy magic bytes: `\x93NUMPY`.
const MAGIC: &[Magic] = &[Magic::prefix(b"\x93NUMPY")];

const EXTENSIONS: &[(&str, &str)] = &[(".npy", "NumPy Array")];

/// NumPy array reader and writer.
pub struct NpyFormat;

impl NpyFormat {
    fn descriptor() -> FormatDescriptor {
        FormatDescriptor {
            id: "npy",
            extensions: EXTENSIONS,
            magic: MAGIC,
            capabilities: Capabilities::ALL_DEPTHS
                | Capabilities::IMAGE_2D
                | Capabilities::IMAGE_3D,
            uses_mm: false,
        }
    }
}

/// Try each supported element type until one decodes.
fn decode_array(bytes: &[u8]) -> Option<(Vec<usize>, PixelData)> {
    macro_rules! try_dtype {
        ($ty:ty, $variant:ident) => {
            if let Ok(array) = ArrayD::<$ty>::read_npy(Cursor::new(bytes)) {
                let shape = array.shape().to_vec();
                return Some((shape, PixelData::$variant(array.iter().copied().collect())));
            }
        };
    }

    try_dtype!(f32, F32);
    try_dtype!(f64, F64);
    try_dtype!(u8, U8);
    try_dtype!(i8, I8);
    try_dtype!(u16, U16);
    try_dtype!(i16, I16);
    try_dtype!(u32, U32);
    try_dtype!(i32, I32);
    None
}

/// Map an array shape to `(dimensions, components)`.
fn shape_to_layout(shape: &[usize]) -> Option<([usize; 3], usize)> {
    match *shape {
        [height, width] => Some(([width, height, 1], 1)),
        [depth, height, width] => Some(([width, height, depth], 1)),
        [depth, height, width, components] => Some(([width, height, depth], components)),
        _ => None,
    }
}

/// Inverse of [`shape_to_layout`], dropping singleton depth and components.
fn layout_to_shape(dimensions: [usize; 3], components: usize) -> Vec<usize> {
    let [width, height, depth] = dimensions;
    match (depth, components) {
        (1, 1) => vec![height, width],
        (_, 1) => vec![depth, height, width],
        _ => vec![depth, height, width, components],
    }
}

impl FormatReader for NpyFormat {
    fn descriptor(&self) -> FormatDescriptor {
        Self::descriptor()
    }

    fn read(&self, path: &Path, progress: &Progress) -> Result<DecodedImage, FormatError> {
        let bytes = fs::read(path)?;
        progress.report(0.0);

        let (shape, data) = decode_array(&bytes)
            .ok_or_else(|| FormatError::decode(path, "npy", "unsupported dtype"))?;
        let (dimensions, components) = shape_to_layout(&shape).ok_or_else(|| {
            FormatError::decode(path, "npy", format!("unsupported shape {:?}", shape))
        })?;

        let buffer = PixelBuffer::new(dimensions, components, data)
            .map_err(|e| FormatError::decode(path, "npy", e))?;

        log::info!(
            "NpyFormat: loaded {:?} {} array from {:?}",
            shape,
            buffer.scalar_type().name(),
            path
        );
        progress.report(1.0);
        Ok(DecodedImage::new(buffer))
    }
}

impl FormatWriter for NpyFormat {
    fn descriptor(&self) -> FormatDescriptor {
        Self::descriptor()
    }

    fn header_style(&self) -> HeaderStyle {
        HeaderStyle::Keywords
    }

    fn write(
        &self,
        path: &Path,
        buffer: &PixelBuffer,
        header: &EncodeHeader,
        progress: &Progress,
    ) -> Result<(), FormatError> {
        let shape = IxDyn(&layout_to_shape(buffer.dimensions(), buffer.components()));
        let writer = BufWriter::new(File::create(path)?);

        macro_rules! write_as {
            ($values:expr) => {
                ArrayD::from_shape_vec(shape, $values.clone())
                    .map_err(|e| FormatError::encode(path, "npy", e))?
                    .write_npy(writer)
                    .map_err(|e| FormatError::encode(path, "npy", e))?
            };
        }

        match buffer.data() {
            PixelData::U8(v) => write_as!(v),
            PixelData::I8(v) => write_as!(v),
            PixelData::U16(v) => write_as!(v),
            PixelData::I16(v) => write_as!(v),
            PixelData::U32(v) => write_as!(v),
            PixelData::I32(v) => write_as!(v),
            PixelData::F32(v) => write_as!(v),
            PixelData::F64(v) => write_as!(v),
        }

        sidecar::write_sidecar(path, header.keywords())?;
        progress.report(1.0);
        log::info!("NpyFormat: wrote {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_layout() {
        assert_eq!(shape_to_layout(&[4, 5]), Some(([5, 4, 1], 1)));
        assert_eq!(shape_to_layout(&[3, 4, 5]), Some(([5, 4, 3], 1)));
        assert_eq!(shape_to_layout(&[3, 4, 5, 2]), Some(([5, 4, 3], 2)));
        assert_eq!(shape_to_layout(&[7]), None);

        assert_eq!(layout_to_shape([5, 4, 1], 1), vec![4, 5]);
        assert_eq!(layout_to_shape([5, 4, 3], 1), vec![3, 4, 5]);
        assert_eq!(layout_to_shape([5, 4, 1], 3), vec![1, 4, 5, 3]);
    }

    #[test]
    fn test_descriptor() {
        let d = NpyFormat::descriptor();
        assert_eq!(d.id, "npy");
        assert_eq!(d.display_name(), "NumPy Array");
        assert!(d.capabilities.contains(Capabilities::IMAGE_3D));
        assert!(!d.whole_filename());
    }
}
