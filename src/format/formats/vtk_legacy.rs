//! Legacy VTK structured points (`.vtk`) codec.
//!
//! Only `DATASET STRUCTURED_POINTS` files with a single `SCALARS` array are
//! handled. Binary payloads are big-endian; ASCII payloads are whitespace
//! separated. Files are always written in binary form.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{header_lines, payload_size};
use crate::format::error::FormatError;
use crate::format::progress::Progress;
use crate::format::traits::{
    Capabilities, DecodedImage, EncodeHeader, FileProbe, FormatDescriptor, FormatReader,
    FormatWriter,
};
use crate::image::{ByteOrder, PixelBuffer, PixelData, ScalarType};

const EXTENSIONS: &[(&str, &str)] = &[(".vtk", "VTK Structured Points")];

const ID: &str = "vtk";

/// Header lines examined by the probe.
const PROBE_LINES: usize = 8;

/// Legacy VTK reader and writer.
pub struct VtkLegacyFormat;

impl VtkLegacyFormat {
    fn descriptor() -> FormatDescriptor {
        FormatDescriptor {
            id: ID,
            extensions: EXTENSIONS,
            magic: &[],
            capabilities: Capabilities::ALL_DEPTHS
                | Capabilities::IMAGE_2D
                | Capabilities::IMAGE_3D,
            uses_mm: true,
        }
    }
}

impl FileProbe for VtkLegacyFormat {
    fn can_read_file(&self, path: &Path) -> Result<u32, FormatError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut line = Vec::new();

        for index in 0..PROBE_LINES {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&line);
            if index == 0 && !text.starts_with("# vtk") {
                return Ok(0);
            }
            let mut words = text.split_whitespace();
            if words.next().is_some_and(|w| w.eq_ignore_ascii_case("DATASET")) {
                let structured = words
                    .next()
                    .is_some_and(|w| w.eq_ignore_ascii_case("STRUCTURED_POINTS"));
                return Ok(u32::from(structured));
            }
        }
        Ok(0)
    }
}

fn scalar_from_name(name: &str) -> Option<ScalarType> {
    Some(match name {
        "unsigned_char" => ScalarType::U8,
        "char" => ScalarType::I8,
        "unsigned_short" => ScalarType::U16,
        "short" => ScalarType::I16,
        "unsigned_int" => ScalarType::U32,
        "int" => ScalarType::I32,
        "float" => ScalarType::F32,
        "double" => ScalarType::F64,
        _ => return None,
    })
}

fn scalar_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::U8 => "unsigned_char",
        ScalarType::I8 => "char",
        ScalarType::U16 => "unsigned_short",
        ScalarType::I16 => "short",
        ScalarType::U32 => "unsigned_int",
        ScalarType::I32 => "int",
        ScalarType::F32 => "float",
        ScalarType::F64 => "double",
    }
}

/// Structure parsed from the text header.
#[derive(Debug)]
struct VtkHeader {
    binary: bool,
    dimensions: [usize; 3],
    spacing: [f64; 3],
    origin: [f64; 3],
    scalar: ScalarType,
    components: usize,
    data_start: usize,
}

fn triple<T: std::str::FromStr + Copy>(
    words: &[&str],
    keyword: &str,
    fill: T,
) -> Result<[T; 3], FormatError> {
    let mut out = [fill; 3];
    for (slot, word) in out.iter_mut().zip(words) {
        *slot = word
            .parse()
            .map_err(|_| FormatError::invalid_header(format!("bad {} value {:?}", keyword, word)))?;
    }
    Ok(out)
}

fn parse_header(bytes: &[u8]) -> Result<VtkHeader, FormatError> {
    let mut lines = header_lines(bytes)
        .map(|(raw, next)| (String::from_utf8_lossy(raw).trim().to_string(), next))
        .peekable();

    let signature = lines.next().map(|(line, _)| line).unwrap_or_default();
    if !signature.starts_with("# vtk") {
        return Err(FormatError::invalid_header("missing '# vtk' signature"));
    }
    // Title
    lines.next();

    let mut binary = None;
    let mut dimensions = None;
    let mut spacing = [1.0; 3];
    let mut origin = [0.0; 3];

    while let Some((line, next)) = lines.next() {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((keyword, args)) = words.split_first() else {
            continue;
        };
        match keyword.to_ascii_uppercase().as_str() {
            "ASCII" => binary = Some(false),
            "BINARY" => binary = Some(true),
            "DATASET" => {
                if !args
                    .first()
                    .is_some_and(|a| a.eq_ignore_ascii_case("STRUCTURED_POINTS"))
                {
                    return Err(FormatError::unsupported(format!("VTK dataset {:?}", args)));
                }
            }
            "DIMENSIONS" => dimensions = Some(triple(args, "DIMENSIONS", 1usize)?),
            "SPACING" | "ASPECT_RATIO" => spacing = triple(args, "SPACING", 1.0)?,
            "ORIGIN" => origin = triple(args, "ORIGIN", 0.0)?,
            "POINT_DATA" => {}
            "SCALARS" => {
                let type_name = args.get(1).copied().unwrap_or_default();
                let scalar = scalar_from_name(type_name).ok_or_else(|| {
                    FormatError::unsupported(format!("VTK scalar type {:?}", type_name))
                })?;
                let components = args.get(2).and_then(|c| c.parse().ok()).unwrap_or(1);

                let mut data_start = next;
                if let Some((_, after)) = lines.next_if(|(l, _)| {
                    l.to_ascii_uppercase().starts_with("LOOKUP_TABLE")
                }) {
                    data_start = after;
                }

                return Ok(VtkHeader {
                    binary: binary
                        .ok_or_else(|| FormatError::invalid_header("missing ASCII/BINARY"))?,
                    dimensions: dimensions
                        .ok_or_else(|| FormatError::invalid_header("missing DIMENSIONS"))?,
                    spacing,
                    origin,
                    scalar,
                    components,
                    data_start,
                });
            }
            _ => {
                return Err(FormatError::unsupported(format!(
                    "VTK keyword {:?}",
                    keyword
                )));
            }
        }
    }

    Err(FormatError::invalid_header("missing SCALARS"))
}

/// Parse `count` whitespace separated values.
fn parse_ascii(text: &[u8], scalar: ScalarType, count: usize) -> Option<PixelData> {
    let text = String::from_utf8_lossy(text);
    let tokens = text.split_whitespace().take(count);

    macro_rules! parse_as {
        ($ty:ty, $variant:ident) => {{
            let values = tokens
                .map(|t| t.parse::<$ty>().ok())
                .collect::<Option<Vec<$ty>>>()?;
            PixelData::$variant(values)
        }};
    }

    let data = match scalar {
        ScalarType::U8 => parse_as!(u8, U8),
        ScalarType::I8 => parse_as!(i8, I8),
        ScalarType::U16 => parse_as!(u16, U16),
        ScalarType::I16 => parse_as!(i16, I16),
        ScalarType::U32 => parse_as!(u32, U32),
        ScalarType::I32 => parse_as!(i32, I32),
        ScalarType::F32 => parse_as!(f32, F32),
        ScalarType::F64 => parse_as!(f64, F64),
    };
    (data.len() == count).then_some(data)
}

impl FormatReader for VtkLegacyFormat {
    fn descriptor(&self) -> FormatDescriptor {
        Self::descriptor()
    }

    fn probe(&self) -> Option<&dyn FileProbe> {
        Some(self)
    }

    fn read(&self, path: &Path, progress: &Progress) -> Result<DecodedImage, FormatError> {
        let bytes = fs::read(path)?;
        let header = parse_header(&bytes)?;
        progress.report(0.1);

        let (count, size) = payload_size(&header.dimensions, header.components, header.scalar)?;
        let payload = &bytes[header.data_start..];
        let data = if header.binary {
            let raw = payload.get(..size).ok_or_else(|| {
                FormatError::decode(path, ID, "binary payload shorter than declared")
            })?;
            PixelData::from_bytes(header.scalar, raw, ByteOrder::BigEndian)
        } else {
            parse_ascii(payload, header.scalar, count).ok_or_else(|| {
                FormatError::decode(path, ID, format!("expected {} ASCII values", count))
            })?
        };

        let buffer = PixelBuffer::new(header.dimensions, header.components, data)
            .map_err(|e| FormatError::decode(path, ID, e))?
            .with_spacing(header.spacing)
            .with_origin(header.origin);

        log::info!(
            "VtkLegacyFormat: loaded {:?} {} {} points",
            header.dimensions,
            if header.binary { "binary" } else { "ASCII" },
            header.scalar.name()
        );
        progress.report(1.0);
        Ok(DecodedImage::new(buffer))
    }
}

fn render_header(buffer: &PixelBuffer) -> String {
    let [x, y, z] = buffer.dimensions();
    let [sx, sy, sz] = buffer.spacing();
    let [ox, oy, oz] = buffer.origin();
    format!(
        "# vtk DataFile Version 3.0\n\
         mvio structured points\n\
         BINARY\n\
         DATASET STRUCTURED_POINTS\n\
         DIMENSIONS {} {} {}\n\
         SPACING {} {} {}\n\
         ORIGIN {} {} {}\n\
         POINT_DATA {}\n\
         SCALARS scalars {} {}\n\
         LOOKUP_TABLE default\n",
        x,
        y,
        z,
        sx,
        sy,
        sz,
        ox,
        oy,
        oz,
        x * y * z,
        scalar_name(buffer.scalar_type()),
        buffer.components()
    )
}

impl FormatWriter for VtkLegacyFormat {
    fn descriptor(&self) -> FormatDescriptor {
        Self::descriptor()
    }

    fn write(
        &self,
        path: &Path,
        buffer: &PixelBuffer,
        _header: &EncodeHeader,
        progress: &Progress,
    ) -> Result<(), FormatError> {
        let mut out = render_header(buffer).into_bytes();
        out.extend_from_slice(&buffer.data().to_bytes(ByteOrder::BigEndian));
        out.push(b'\n');
        fs::write(path, out)?;

        progress.report(1.0);
        log::info!("VtkLegacyFormat: wrote {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII: &[u8] = b"# vtk DataFile Version 2.0\nsample\nASCII\n\
        DATASET STRUCTURED_POINTS\nDIMENSIONS 3 2 1\nSPACING 0.5 0.5 1\n\
        ORIGIN 1 2 0\nPOINT_DATA 6\nSCALARS density short 1\nLOOKUP_TABLE default\n\
        -1 0 1\n2 3 400\n";

    #[test]
    fn test_parse_ascii_header() {
        let header = parse_header(ASCII).unwrap();
        assert!(!header.binary);
        assert_eq!(header.dimensions, [3, 2, 1]);
        assert_eq!(header.spacing, [0.5, 0.5, 1.0]);
        assert_eq!(header.origin, [1.0, 2.0, 0.0]);
        assert_eq!(header.scalar, ScalarType::I16);

        let data = parse_ascii(&ASCII[header.data_start..], header.scalar, 6).unwrap();
        assert_eq!(data, PixelData::I16(vec![-1, 0, 1, 2, 3, 400]));
    }

    #[test]
    fn test_parse_ascii_too_few_values() {
        assert!(parse_ascii(b"1 2", ScalarType::U8, 3).is_none());
        assert!(parse_ascii(b"1 x 3", ScalarType::U8, 3).is_none());
    }

    #[test]
    fn test_rejects_polydata() {
        let err = parse_header(b"# vtk DataFile Version 3.0\nt\nASCII\nDATASET POLYDATA\n")
            .unwrap_err();
        assert!(matches!(err, FormatError::Unsupported { .. }));
    }

    #[test]
    fn test_render_header_roundtrips_geometry() {
        let buffer = PixelBuffer::zeros([4, 3, 2], 1, ScalarType::F32)
            .with_spacing([1.0, 1.0, 2.5])
            .with_origin([0.0, 0.0, 10.0]);
        let text = render_header(&buffer);
        let header = parse_header(text.as_bytes()).unwrap();
        assert!(header.binary);
        assert_eq!(header.dimensions, [4, 3, 2]);
        assert_eq!(header.spacing, [1.0, 1.0, 2.5]);
        assert_eq!(header.origin, [0.0, 0.0, 10.0]);
        assert_eq!(header.scalar, ScalarType::F32);
        assert_eq!(header.data_start, text.len());
    }
}
