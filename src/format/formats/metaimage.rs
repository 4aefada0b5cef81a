//! MetaImage (`.mha` / `.mhd`) codec.
//!
//! The header is a list of `Key = Value` lines ending with
//! `ElementDataFile`. With `ElementDataFile = LOCAL` the raw pixels follow
//! immediately; otherwise the value names a data file next to the header.
//! Lines with keys this codec does not interpret are returned as free-form
//! header entries, and keyword headers handed to the writer are emitted the
//! same way.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use super::{header_lines, payload_size};
use crate::format::error::FormatError;
use crate::format::magic::Magic;
use crate::format::progress::Progress;
use crate::format::sidecar;
use crate::format::traits::{
    Capabilities, DecodedImage, EncodeHeader, FormatDescriptor, FormatReader, FormatWriter,
    HeaderStyle,
};
use crate::header::{FreeformHeader, HeaderValue};
use crate::image::{ByteOrder, PixelBuffer, PixelData, ScalarType};

const MAGIC: &[Magic] = &[Magic::prefix(b"ObjectType =")];

const EXTENSIONS: &[(&str, &str)] = &[(".mha", "MetaImage"), (".mhd", "MetaImage")];

const ID: &str = "metaimage";

/// Keys interpreted (or deliberately ignored) by the codec itself.
const STRUCTURAL_KEYS: &[&str] = &[
    "ObjectType",
    "NDims",
    "BinaryData",
    "BinaryDataByteOrderMSB",
    "ElementByteOrderMSB",
    "CompressedData",
    "CompressedDataSize",
    "TransformMatrix",
    "Rotation",
    "Orientation",
    "CenterOfRotation",
    "AnatomicalOrientation",
    "Offset",
    "Position",
    "Origin",
    "ElementSpacing",
    "ElementSize",
    "DimSize",
    "HeaderSize",
    "ElementType",
    "ElementNumberOfChannels",
    "ElementDataFile",
];

/// MetaImage reader and writer.
pub struct MetaImageFormat;

impl MetaImageFormat {
    fn descriptor() -> FormatDescriptor {
        FormatDescriptor {
            id: ID,
            extensions: EXTENSIONS,
            magic: MAGIC,
            capabilities: Capabilities::ALL_DEPTHS
                | Capabilities::IMAGE_2D
                | Capabilities::IMAGE_3D,
            uses_mm: true,
        }
    }
}

fn element_type(name: &str) -> Option<ScalarType> {
    Some(match name {
        "MET_UCHAR" => ScalarType::U8,
        "MET_CHAR" => ScalarType::I8,
        "MET_USHORT" => ScalarType::U16,
        "MET_SHORT" => ScalarType::I16,
        "MET_UINT" => ScalarType::U32,
        "MET_INT" => ScalarType::I32,
        "MET_FLOAT" => ScalarType::F32,
        "MET_DOUBLE" => ScalarType::F64,
        _ => return None,
    })
}

fn element_type_name(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::U8 => "MET_UCHAR",
        ScalarType::I8 => "MET_CHAR",
        ScalarType::U16 => "MET_USHORT",
        ScalarType::I16 => "MET_SHORT",
        ScalarType::U32 => "MET_UINT",
        ScalarType::I32 => "MET_INT",
        ScalarType::F32 => "MET_FLOAT",
        ScalarType::F64 => "MET_DOUBLE",
    }
}

fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>, FormatError> {
    value
        .split_whitespace()
        .map(|v| {
            v.parse()
                .map_err(|_| FormatError::invalid_header(format!("bad {} value {:?}", key, v)))
        })
        .collect()
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Pad or truncate to three axes.
fn pad3<T: Copy>(values: &[T], fill: T) -> [T; 3] {
    let mut out = [fill; 3];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = *value;
    }
    out
}

/// Parsed MetaImage header.
#[derive(Debug)]
struct MetaHeader {
    dim_size: Vec<usize>,
    spacing: Vec<f64>,
    offset: Vec<f64>,
    element_type: Option<ScalarType>,
    channels: usize,
    msb: bool,
    compressed: bool,
    header_size: i64,
    data_file: String,
    extra: FreeformHeader,
    /// Byte offset of the first pixel for LOCAL data.
    data_start: usize,
}

impl Default for MetaHeader {
    fn default() -> Self {
        Self {
            dim_size: Vec::new(),
            spacing: Vec::new(),
            offset: Vec::new(),
            element_type: None,
            channels: 1,
            msb: false,
            compressed: false,
            header_size: 0,
            data_file: String::new(),
            extra: FreeformHeader::new(),
            data_start: 0,
        }
    }
}

impl MetaHeader {
    fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut header = Self::default();

        for (raw, next) in header_lines(bytes) {
            let line = String::from_utf8_lossy(raw);
            let Some((key, value)) = sidecar::parse_line(&line) else {
                continue;
            };
            match key {
                "NDims" => {
                    let ndims: usize = value
                        .parse()
                        .map_err(|_| FormatError::invalid_header(format!("bad NDims {:?}", value)))?;
                    if !(1..=3).contains(&ndims) {
                        return Err(FormatError::unsupported(format!("{} dimensions", ndims)));
                    }
                }
                "DimSize" => header.dim_size = parse_list(key, value)?,
                "ElementSpacing" => header.spacing = parse_list(key, value)?,
                "ElementSize" if header.spacing.is_empty() => {
                    header.spacing = parse_list(key, value)?
                }
                "Offset" | "Position" | "Origin" => header.offset = parse_list(key, value)?,
                "ElementType" => header.element_type = element_type(value),
                "ElementNumberOfChannels" => {
                    header.channels = value.parse().map_err(|_| {
                        FormatError::invalid_header(format!("bad channel count {:?}", value))
                    })?
                }
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => header.msb = parse_flag(value),
                "CompressedData" => header.compressed = parse_flag(value),
                "HeaderSize" => {
                    header.header_size = value.parse().map_err(|_| {
                        FormatError::invalid_header(format!("bad HeaderSize {:?}", value))
                    })?
                }
                "ElementDataFile" => {
                    header.data_file = value.to_string();
                    header.data_start = next;
                    return Ok(header);
                }
                _ if STRUCTURAL_KEYS.contains(&key) => {}
                _ => {
                    header
                        .extra
                        .insert(key.to_string(), HeaderValue::from(value));
                }
            }
        }

        Err(FormatError::invalid_header("missing ElementDataFile"))
    }

    fn is_local(&self) -> bool {
        self.data_file.eq_ignore_ascii_case("LOCAL")
    }
}

/// Cut the pixel bytes out of a detached data file.
fn detached_pixels(data: &[u8], header_size: i64, expected: usize) -> Option<&[u8]> {
    if header_size < 0 {
        let start = data.len().checked_sub(expected)?;
        return Some(&data[start..]);
    }
    let start = usize::try_from(header_size).ok()?;
    data.get(start..start.checked_add(expected)?)
}

impl FormatReader for MetaImageFormat {
    fn descriptor(&self) -> FormatDescriptor {
        Self::descriptor()
    }

    fn read(&self, path: &Path, progress: &Progress) -> Result<DecodedImage, FormatError> {
        let bytes = fs::read(path)?;
        let header = MetaHeader::parse(&bytes)?;

        if header.compressed {
            return Err(FormatError::unsupported("compressed MetaImage data"));
        }
        if header.dim_size.is_empty() {
            return Err(FormatError::invalid_header("missing DimSize"));
        }
        if header.data_file.eq_ignore_ascii_case("LIST") || header.data_file.contains('%') {
            return Err(FormatError::unsupported("multi-file MetaImage data"));
        }
        let scalar = header
            .element_type
            .ok_or_else(|| FormatError::invalid_header("missing or unknown ElementType"))?;
        progress.report(0.1);

        let dimensions = pad3(&header.dim_size, 1);
        let (_, expected) = payload_size(&dimensions, header.channels, scalar)?;

        let detached;
        let pixels = (if header.is_local() {
            header
                .data_start
                .checked_add(expected)
                .and_then(|end| bytes.get(header.data_start..end))
        } else {
            let data_path = path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(&header.data_file);
            log::debug!("MetaImageFormat: reading detached data {:?}", data_path);
            detached = fs::read(&data_path)?;
            detached_pixels(&detached, header.header_size, expected)
        })
        .ok_or_else(|| {
            FormatError::decode(path, ID, format!("pixel data shorter than {} bytes", expected))
        })?;

        let order = if header.msb {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        };
        let data = PixelData::from_bytes(scalar, pixels, order);
        progress.report(0.9);

        let buffer = PixelBuffer::new(dimensions, header.channels, data)
            .map_err(|e| FormatError::decode(path, ID, e))?
            .with_spacing(pad3(&header.spacing, 1.0))
            .with_origin(pad3(&header.offset, 0.0));

        log::info!(
            "MetaImageFormat: loaded {:?} {} image ({} extra keys)",
            dimensions,
            scalar.name(),
            header.extra.len()
        );
        progress.report(1.0);
        Ok(DecodedImage::new(buffer).with_header(header.extra))
    }
}

/// Render the text header for `buffer`.
fn render_header(buffer: &PixelBuffer, data_file: &str, header: &EncodeHeader) -> String {
    let [x, y, z] = buffer.dimensions();
    let spacing = buffer.spacing();
    let origin = buffer.origin();
    let three_d = z > 1;

    let join = |values: &[String]| values.join(" ");
    let axes = |v: [f64; 3]| {
        let n = if three_d { 3 } else { 2 };
        join(&v[..n].iter().map(|f| f.to_string()).collect::<Vec<_>>())
    };

    let mut lines: Vec<(String, String)> = vec![
        ("ObjectType".into(), "Image".into()),
        ("NDims".into(), (if three_d { "3" } else { "2" }).into()),
        ("BinaryData".into(), "True".into()),
        ("BinaryDataByteOrderMSB".into(), "False".into()),
        ("CompressedData".into(), "False".into()),
        ("Offset".into(), axes(origin)),
        ("ElementSpacing".into(), axes(spacing)),
        (
            "DimSize".into(),
            if three_d {
                format!("{} {} {}", x, y, z)
            } else {
                format!("{} {}", x, y)
            },
        ),
    ];
    if buffer.components() > 1 {
        lines.push((
            "ElementNumberOfChannels".into(),
            buffer.components().to_string(),
        ));
    }
    lines.push((
        "ElementType".into(),
        element_type_name(buffer.scalar_type()).into(),
    ));

    for (key, value) in header.keywords() {
        let valid = !key.is_empty() && !key.contains(|c: char| c.is_whitespace() || c == '=');
        if !valid || STRUCTURAL_KEYS.contains(&key) {
            log::warn!("MetaImageFormat: skipping header key {:?}", key);
            continue;
        }
        lines.push((key.to_string(), value.replace(['\r', '\n'], " ")));
    }
    lines.push(("ElementDataFile".into(), data_file.to_string()));

    sidecar::render(lines.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

impl FormatWriter for MetaImageFormat {
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
        let detached = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mhd"));
        let pixels = buffer.data().to_bytes(ByteOrder::LittleEndian);

        if detached {
            let raw_path = path.with_extension("raw");
            let raw_name = raw_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| FormatError::encode(path, ID, "output path has no file name"))?;
            fs::write(path, render_header(buffer, &raw_name, header))?;
            progress.report(0.5);
            fs::write(&raw_path, &pixels)?;
        } else {
            let mut out = render_header(buffer, "LOCAL", header).into_bytes();
            out.extend_from_slice(&pixels);
            fs::write(path, out)?;
        }

        progress.report(1.0);
        log::info!("MetaImageFormat: wrote {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_local() {
        let mut bytes = b"ObjectType = Image\nNDims = 2\nDimSize = 2 2\n\
            ElementType = MET_USHORT\nElementSpacing = 0.5 0.25\n\
            dicom_Modality = MR\nFoo = bar\nElementDataFile = LOCAL\n"
            .to_vec();
        let data_start = bytes.len();
        bytes.extend_from_slice(&[1, 0, 2, 0, 3, 0, 4, 0]);

        let header = MetaHeader::parse(&bytes).unwrap();
        assert_eq!(header.dim_size, vec![2, 2]);
        assert_eq!(header.spacing, vec![0.5, 0.25]);
        assert_eq!(header.element_type, Some(ScalarType::U16));
        assert!(header.is_local());
        assert_eq!(header.data_start, data_start);

        let keys: Vec<_> = header.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["dicom_Modality", "Foo"]);
    }

    #[test]
    fn test_parse_header_missing_data_file() {
        let err = MetaHeader::parse(b"ObjectType = Image\nDimSize = 1 1\n").unwrap_err();
        assert!(matches!(err, FormatError::InvalidHeader { .. }));
    }

    #[test]
    fn test_parse_header_rejects_4d() {
        let err = MetaHeader::parse(b"ObjectType = Image\nNDims = 4\n").unwrap_err();
        assert!(matches!(err, FormatError::Unsupported { .. }));
    }

    #[test]
    fn test_detached_pixels() {
        let data = [9u8, 9, 1, 2, 3, 4];
        assert_eq!(detached_pixels(&data, 2, 4), Some(&data[2..]));
        assert_eq!(detached_pixels(&data, -1, 4), Some(&data[2..]));
        assert_eq!(detached_pixels(&data, 4, 4), None);
    }

    #[test]
    fn test_render_header_2d() {
        let buffer = PixelBuffer::zeros([3, 2, 1], 1, ScalarType::I16).with_spacing([0.5, 0.5, 1.0]);
        let mut keywords = indexmap::IndexMap::new();
        keywords.insert("dicom_PatientID".to_string(), "P7".to_string());
        keywords.insert("DimSize".to_string(), "9 9".to_string());

        let text = render_header(&buffer, "LOCAL", &EncodeHeader::Keywords(keywords));
        assert!(text.starts_with("ObjectType = Image\nNDims = 2\n"));
        assert!(text.contains("DimSize = 3 2\n"));
        assert!(text.contains("ElementSpacing = 0.5 0.5\n"));
        assert!(text.contains("ElementType = MET_SHORT\n"));
        assert!(text.contains("dicom_PatientID = P7\n"));
        assert!(!text.contains("9 9"));
        assert!(text.ends_with("ElementDataFile = LOCAL\n"));
    }
}
