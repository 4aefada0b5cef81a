//! Built-in image codecs.

mod metaimage;
mod npy;
mod raster;
mod vff;
mod vtk_legacy;

#[cfg(test)]
mod tests;

pub use metaimage::MetaImageFormat;
pub use npy::NpyFormat;
pub use raster::RasterFormat;
pub use vff::VffFormat;
pub use vtk_legacy::VtkLegacyFormat;

use crate::format::error::FormatError;
use crate::image::ScalarType;

/// Number of component values a header declares, and their size in bytes.
///
/// Fails with `InvalidHeader` when a damaged header declares more data
/// than fits in `usize`.
fn payload_size(
    dimensions: &[usize],
    components: usize,
    scalar: ScalarType,
) -> Result<(usize, usize), FormatError> {
    let count = dimensions
        .iter()
        .try_fold(components, |acc, &d| acc.checked_mul(d));
    count
        .and_then(|count| Some((count, count.checked_mul(scalar.size())?)))
        .ok_or_else(|| {
            FormatError::invalid_header(format!(
                "declared size {:?} x {} {} overflows",
                dimensions,
                components,
                scalar.name()
            ))
        })
}

/// Lines of a text header followed by binary data.
///
/// Yields each line without its `\n` together with the offset of the byte
/// after it, so a caller can stop at the last header line and know where
/// the payload begins.
fn header_lines(bytes: &[u8]) -> impl Iterator<Item = (&[u8], usize)> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= bytes.len() {
            return None;
        }
        let start = pos;
        let end = bytes[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| start + i);
        pos = (end + 1).min(bytes.len());
        let line = bytes[start..end].strip_suffix(b"\r").unwrap_or(&bytes[start..end]);
        Some((line, pos))
    })
}
