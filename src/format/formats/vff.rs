//! Sun VFF (`.vff`) raster codec.
//!
//! Layout:
//! ```text
//! ncaa
//! key=value;
//! ...
//! \f
//! <big-endian raw pixels>
//! ```
//! `bits` selects the scalar type (8 unsigned, 16 signed, 32 float).
//! `spacing` is multiplied by `elementsize`, and `origin` is given in
//! voxels. Keys not used for the geometry are returned as free-form
//! header entries (`title`, `subject`, `date`, ...).

use std::fs;
use std::path::Path;

use super::{header_lines, payload_size};
use crate::format::error::FormatError;
use crate::format::magic::Magic;
use crate::format::progress::Progress;
use crate::format::traits::{
    Capabilities, DecodedImage, EncodeHeader, FormatDescriptor, FormatReader, FormatWriter,
    HeaderStyle,
};
use crate::header::{FreeformHeader, HeaderValue};
use crate::image::{ByteOrder, PixelBuffer, PixelData, ScalarType};

const MAGIC: &[Magic] = &[Magic::prefix(b"ncaa")];

const EXTENSIONS: &[(&str, &str)] = &[(".vff", "Sun VFF")];

const ID: &str = "vff";

/// Keys consumed by the geometry or regenerated on write.
const STRUCTURAL_KEYS: &[&str] = &[
    "type",
    "format",
    "bands",
    "bits",
    "rank",
    "size",
    "rawsize",
    "spacing",
    "elementsize",
    "origin",
];

/// VFF reader and writer.
pub struct VffFormat;

impl VffFormat {
    fn descriptor() -> FormatDescriptor {
        FormatDescriptor {
            id: ID,
            extensions: EXTENSIONS,
            magic: MAGIC,
            capabilities: Capabilities::DEPTH_8
                | Capabilities::DEPTH_16
                | Capabilities::DEPTH_32
                | Capabilities::IMAGE_2D
                | Capabilities::IMAGE_3D,
            uses_mm: true,
        }
    }
}

/// Split the header from the pixel data.
///
/// Returns the ordered `key=value` pairs and the offset of the first pixel.
fn parse_header(bytes: &[u8]) -> Result<(FreeformHeader, usize), FormatError> {
    let mut entries = FreeformHeader::new();
    let mut first = true;

    for (raw, next) in header_lines(bytes) {
        if first {
            if !raw.starts_with(b"ncaa") {
                return Err(FormatError::invalid_header("first line must read 'ncaa'"));
            }
            first = false;
            continue;
        }
        if raw.first() == Some(&b'\x0c') {
            return Ok((entries, next));
        }

        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let body = line
            .rfind(';')
            .map(|i| line[..i].trim_end())
            .ok_or_else(|| FormatError::invalid_header(format!("line {:?} lacks ';'", line)))?;
        let (key, value) = body
            .split_once('=')
            .ok_or_else(|| FormatError::invalid_header(format!("line {:?} lacks '='", line)))?;
        entries.insert(key.trim().to_string(), HeaderValue::from(value.trim()));
    }

    Err(FormatError::invalid_header("missing form feed terminator"))
}

fn numbers(entries: &FreeformHeader, key: &str) -> Option<Vec<f64>> {
    let text = entries.get(key)?.as_text()?;
    text.split_whitespace().map(|v| v.parse().ok()).collect()
}

fn scalar_for_bits(bits: u32) -> Option<ScalarType> {
    match bits {
        8 => Some(ScalarType::U8),
        16 => Some(ScalarType::I16),
        32 => Some(ScalarType::F32),
        _ => None,
    }
}

/// Geometry decoded from the header entries.
#[derive(Debug, PartialEq)]
struct Geometry {
    dimensions: [usize; 3],
    components: usize,
    scalar: ScalarType,
    spacing: [f64; 3],
    origin: [f64; 3],
}

fn geometry(entries: &FreeformHeader) -> Result<Geometry, FormatError> {
    let field = |key: &str| {
        numbers(entries, key)
            .ok_or_else(|| FormatError::invalid_header(format!("cannot parse '{}'", key)))
    };

    let bits = field("bits")?.first().copied().unwrap_or_default();
    let scalar = scalar_for_bits(bits as u32)
        .ok_or_else(|| FormatError::unsupported(format!("{} bit VFF data", bits)))?;

    let rank = field("rank")?.first().copied().unwrap_or_default() as usize;
    if !(2..=3).contains(&rank) {
        return Err(FormatError::unsupported(format!("rank {} VFF data", rank)));
    }

    let size = field("size")?;
    if size.len() < rank {
        return Err(FormatError::invalid_header("'size' shorter than rank"));
    }
    let mut dimensions = [1usize; 3];
    for (slot, value) in dimensions.iter_mut().zip(&size) {
        *slot = *value as usize;
    }

    let mut spacing = [1.0; 3];
    if let Some(values) = numbers(entries, "spacing") {
        for (slot, value) in spacing.iter_mut().zip(&values) {
            *slot = *value;
        }
    }
    if let Some(scale) = numbers(entries, "elementsize").and_then(|v| v.first().copied()) {
        spacing.iter_mut().for_each(|s| *s *= scale);
    }

    let mut origin = [0.0; 3];
    if let Some(values) = numbers(entries, "origin") {
        for ((slot, value), step) in origin.iter_mut().zip(&values).zip(spacing) {
            *slot = value * step;
        }
    }

    let components = numbers(entries, "bands")
        .and_then(|v| v.first().copied())
        .map_or(1, |b| b as usize)
        .max(1);

    Ok(Geometry {
        dimensions,
        components,
        scalar,
        spacing,
        origin,
    })
}

impl FormatReader for VffFormat {
    fn descriptor(&self) -> FormatDescriptor {
        Self::descriptor()
    }

    fn read(&self, path: &Path, progress: &Progress) -> Result<DecodedImage, FormatError> {
        let bytes = fs::read(path)?;
        let (mut entries, data_start) = parse_header(&bytes)?;
        let geometry = geometry(&entries)?;
        progress.report(0.1);

        let (_, expected) =
            payload_size(&geometry.dimensions, geometry.components, geometry.scalar)?;
        let raw = data_start
            .checked_add(expected)
            .and_then(|end| bytes.get(data_start..end))
            .ok_or_else(|| {
                FormatError::decode(path, ID, format!("pixel data shorter than {} bytes", expected))
            })?;
        let data = PixelData::from_bytes(geometry.scalar, raw, ByteOrder::BigEndian);

        let buffer = PixelBuffer::new(geometry.dimensions, geometry.components, data)
            .map_err(|e| FormatError::decode(path, ID, e))?
            .with_spacing(geometry.spacing)
            .with_origin(geometry.origin);

        entries.retain(|key, _| !STRUCTURAL_KEYS.contains(&key.as_str()));
        log::info!(
            "VffFormat: loaded {:?} {} image",
            geometry.dimensions,
            geometry.scalar.name()
        );
        progress.report(1.0);
        Ok(DecodedImage::new(buffer).with_header(entries))
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the text header, including the form feed line.
fn render_header(buffer: &PixelBuffer, bits: usize, header: &EncodeHeader) -> String {
    let [x, y, z] = buffer.dimensions();
    let rank = if z > 1 { 3 } else { 2 };
    let spacing = buffer.spacing();
    let origin = buffer.origin();
    let voxel_origin: Vec<f64> = origin
        .iter()
        .zip(spacing)
        .map(|(o, s)| if s == 0.0 { *o } else { o / s })
        .collect();
    let rawsize = buffer.data().len() * buffer.scalar_type().size();

    let mut out = String::from("ncaa\ntype=raster;\nformat=slice;\n");
    out.push_str(&format!("bands={};\n", buffer.components()));
    out.push_str(&format!("rank={};\n", rank));
    out.push_str(&format!("bits={};\n", bits));
    let size = if rank == 3 {
        format!("{} {} {}", x, y, z)
    } else {
        format!("{} {}", x, y)
    };
    out.push_str(&format!("size={};\n", size));
    out.push_str(&format!("rawsize={};\n", rawsize));
    out.push_str(&format!("origin={};\n", join(&voxel_origin[..rank])));
    out.push_str(&format!("spacing={};\n", join(&spacing[..rank])));

    for (key, value) in header.keywords() {
        if key.starts_with("hidden") || STRUCTURAL_KEYS.contains(&key) {
            continue;
        }
        if key.is_empty() || key.contains(['=', ';', '\n']) {
            log::warn!("VffFormat: skipping header key {:?}", key);
            continue;
        }
        let value = value.replace([';', '\r', '\n'], " ");
        out.push_str(&format!("{}={};\n", key, value));
    }
    out.push_str("\x0c\n");
    out
}

impl FormatWriter for VffFormat {
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
        let bits = match buffer.scalar_type() {
            ScalarType::U8 => 8,
            ScalarType::I16 => 16,
            ScalarType::F32 => 32,
            other => {
                return Err(FormatError::unsupported(format!(
                    "VFF cannot store {} data",
                    other.name()
                )));
            }
        };

        let mut out = render_header(buffer, bits, header).into_bytes();
        progress.report(0.1);
        out.extend_from_slice(&buffer.data().to_bytes(ByteOrder::BigEndian));
        fs::write(path, out)?;

        progress.report(1.0);
        log::info!("VffFormat: wrote {:?}", path);
        Ok(())
    }
}
