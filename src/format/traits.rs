//! Trait definitions for format handler implementations.

use std::path::Path;

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::format::error::FormatError;
use crate::format::magic::Magic;
use crate::format::progress::Progress;
use crate::header::{FreeformHeader, MetadataRecord};
use crate::image::PixelBuffer;

bitflags! {
    /// What a handler can read or write.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const DEPTH_8 = 1 << 0;
        const DEPTH_16 = 1 << 1;
        const DEPTH_32 = 1 << 2;
        const DEPTH_64 = 1 << 3;
        const IMAGE_2D = 1 << 4;
        const IMAGE_3D = 1 << 5;
        /// Matched by exact filename instead of extension and magic.
        const WHOLE_FILENAME = 1 << 6;

        const ALL_DEPTHS = Self::DEPTH_8.bits()
            | Self::DEPTH_16.bits()
            | Self::DEPTH_32.bits()
            | Self::DEPTH_64.bits();
    }
}

/// Static description of a handler, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Unique identifier (e.g., "metaimage", "vff").
    pub id: &'static str,
    /// `(extension, format name)` pairs. Extensions include the leading dot.
    /// For whole-filename handlers these are the recognised filenames.
    pub extensions: &'static [(&'static str, &'static str)],
    /// Signature probes, all of which must match.
    pub magic: &'static [Magic],
    pub capabilities: Capabilities,
    /// Spatial units are millimetres rather than pixels.
    pub uses_mm: bool,
}

impl FormatDescriptor {
    /// Whether this handler is matched by exact filename.
    pub fn whole_filename(&self) -> bool {
        self.capabilities.contains(Capabilities::WHOLE_FILENAME)
    }

    /// Format name of the first extension, or the id.
    pub fn display_name(&self) -> &'static str {
        self.extensions.first().map_or(self.id, |(_, name)| *name)
    }
}

/// Content-based probe for handlers that cannot be recognised by magic
/// alone.
pub trait FileProbe {
    /// Confidence that the file is in this format; zero means no.
    fn can_read_file(&self, path: &Path) -> Result<u32, FormatError>;
}

/// Output of a successful decode.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub buffer: PixelBuffer,
    /// Format-native header entries, in file order.
    pub header: FreeformHeader,
}

impl DecodedImage {
    pub fn new(buffer: PixelBuffer) -> Self {
        Self {
            buffer,
            header: FreeformHeader::new(),
        }
    }

    pub fn with_header(mut self, header: FreeformHeader) -> Self {
        self.header = header;
        self
    }
}

/// Trait for format readers.
pub trait FormatReader: Send + Sync {
    fn descriptor(&self) -> FormatDescriptor;

    /// Content probe used instead of the magic list, if the format needs one.
    fn probe(&self) -> Option<&dyn FileProbe> {
        None
    }

    /// Decode the file at `path`.
    fn read(&self, path: &Path, progress: &Progress) -> Result<DecodedImage, FormatError>;
}

/// How a writer accepts header metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderStyle {
    /// No header metadata is written.
    #[default]
    None,
    /// Flat `key = value` pairs (`dicom_<Keyword>` for record elements).
    Keywords,
    /// The record itself.
    Structured,
}

/// Header metadata handed to a writer, shaped by its [`HeaderStyle`].
#[derive(Debug, Clone, Default)]
pub enum EncodeHeader {
    #[default]
    None,
    Keywords(IndexMap<String, String>),
    Structured(MetadataRecord),
}

impl EncodeHeader {
    /// Keyword pairs, empty for other styles.
    pub fn keywords(&self) -> impl Iterator<Item = (&str, &str)> {
        let map = match self {
            EncodeHeader::Keywords(map) => Some(map),
            _ => None,
        };
        map.into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Trait for format writers.
pub trait FormatWriter: Send + Sync {
    fn descriptor(&self) -> FormatDescriptor;

    fn header_style(&self) -> HeaderStyle {
        HeaderStyle::None
    }

    /// Encode `buffer` to `path`.
    fn write(
        &self,
        path: &Path,
        buffer: &PixelBuffer,
        header: &EncodeHeader,
        progress: &Progress,
    ) -> Result<(), FormatError>;
}
