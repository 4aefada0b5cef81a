//! Codecs for standard 2D raster formats (PNG, BMP, JPEG, TIFF, PNM).
//!
//! Decoding and encoding go through the `image` crate. Channels are kept
//! interleaved as pixel components; rows stay in file order.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat};

use crate::format::error::FormatError;
use crate::format::magic::Magic;
use crate::format::progress::Progress;
use crate::format::traits::{
    Capabilities, DecodedImage, EncodeHeader, FileProbe, FormatDescriptor, FormatReader,
    FormatWriter,
};
use crate::image::{PixelBuffer, PixelData};

const PNG_MAGIC: &[Magic] = &[Magic::prefix(b"\x89PNG\r\n\x1a\n")];
const BMP_MAGIC: &[Magic] = &[Magic::prefix(b"BM")];
const JPEG_MAGIC: &[Magic] = &[Magic::prefix(&[0xFF, 0xD8, 0xFF])];
/// TIFF and PNM are recognised by [`FileProbe`] instead.
const NO_MAGIC: &[Magic] = &[];

const PNG_EXTENSIONS: &[(&str, &str)] = &[(".png", "PNG")];
const BMP_EXTENSIONS: &[(&str, &str)] = &[(".bmp", "BMP")];
const JPEG_EXTENSIONS: &[(&str, &str)] = &[(".jpg", "JPEG"), (".jpeg", "JPEG")];
const TIFF_EXTENSIONS: &[(&str, &str)] = &[(".tif", "TIFF"), (".tiff", "TIFF")];
const PNM_EXTENSIONS: &[(&str, &str)] = &[(".pnm", "PNM"), (".pgm", "PNM"), (".ppm", "PNM")];

/// One raster file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Bmp,
    Jpeg,
    Tiff,
    Pnm,
}

impl RasterFormat {
    /// Every raster type, in registration order.
    pub const fn all() -> [RasterFormat; 5] {
        [
            RasterFormat::Png,
            RasterFormat::Bmp,
            RasterFormat::Jpeg,
            RasterFormat::Tiff,
            RasterFormat::Pnm,
        ]
    }

    const fn id(&self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Bmp => "bmp",
            RasterFormat::Jpeg => "jpeg",
            RasterFormat::Tiff => "tiff",
            RasterFormat::Pnm => "pnm",
        }
    }

    const fn image_format(&self) -> ImageFormat {
        match self {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Bmp => ImageFormat::Bmp,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
            RasterFormat::Tiff => ImageFormat::Tiff,
            RasterFormat::Pnm => ImageFormat::Pnm,
        }
    }

    /// Whether the encoder keeps 16-bit samples.
    const fn keeps_16bit(&self) -> bool {
        matches!(
            self,
            RasterFormat::Png | RasterFormat::Tiff | RasterFormat::Pnm
        )
    }

    /// Whether the encoder keeps an alpha channel.
    const fn keeps_alpha(&self) -> bool {
        matches!(
            self,
            RasterFormat::Png | RasterFormat::Tiff | RasterFormat::Bmp
        )
    }

    fn format_descriptor(&self) -> FormatDescriptor {
        let (extensions, magic, depths) = match self {
            RasterFormat::Png => (PNG_EXTENSIONS, PNG_MAGIC, Capabilities::DEPTH_16),
            RasterFormat::Bmp => (BMP_EXTENSIONS, BMP_MAGIC, Capabilities::empty()),
            RasterFormat::Jpeg => (JPEG_EXTENSIONS, JPEG_MAGIC, Capabilities::empty()),
            RasterFormat::Tiff => (TIFF_EXTENSIONS, NO_MAGIC, Capabilities::DEPTH_16),
            RasterFormat::Pnm => (PNM_EXTENSIONS, NO_MAGIC, Capabilities::DEPTH_16),
        };
        FormatDescriptor {
            id: self.id(),
            extensions,
            magic,
            capabilities: Capabilities::DEPTH_8 | Capabilities::IMAGE_2D | depths,
            uses_mm: false,
        }
    }
}

impl FileProbe for RasterFormat {
    fn can_read_file(&self, path: &Path) -> Result<u32, FormatError> {
        let mut head = [0u8; 4];
        let mut file = File::open(path)?;
        let read = file.read(&mut head)?;
        let head = &head[..read];

        let matched = match self {
            RasterFormat::Tiff => head == b"II*\0" || head == b"MM\0*",
            RasterFormat::Pnm => {
                head.len() >= 2 && head[0] == b'P' && (b'1'..=b'7').contains(&head[1])
            }
            _ => false,
        };
        Ok(u32::from(matched))
    }
}

/// Split a decoded image into interleaved components.
fn to_pixel_data(img: DynamicImage) -> (usize, PixelData) {
    match img {
        DynamicImage::ImageLuma8(b) => (1, PixelData::U8(b.into_raw())),
        DynamicImage::ImageLumaA8(b) => (2, PixelData::U8(b.into_raw())),
        DynamicImage::ImageRgb8(b) => (3, PixelData::U8(b.into_raw())),
        DynamicImage::ImageRgba8(b) => (4, PixelData::U8(b.into_raw())),
        DynamicImage::ImageLuma16(b) => (1, PixelData::U16(b.into_raw())),
        DynamicImage::ImageLumaA16(b) => (2, PixelData::U16(b.into_raw())),
        DynamicImage::ImageRgb16(b) => (3, PixelData::U16(b.into_raw())),
        DynamicImage::ImageRgba16(b) => (4, PixelData::U16(b.into_raw())),
        DynamicImage::ImageRgb32F(b) => (3, PixelData::F32(b.into_raw())),
        DynamicImage::ImageRgba32F(b) => (4, PixelData::F32(b.into_raw())),
        other => (4, PixelData::U8(other.to_rgba8().into_raw())),
    }
}

/// Build an 8- or 16-bit image from buffer values. Signed 16-bit values
/// saturate at zero.
fn to_dynamic_image(buffer: &PixelBuffer) -> Option<DynamicImage> {
    let [width, height, _] = buffer.dimensions();
    let (w, h) = (u32::try_from(width).ok()?, u32::try_from(height).ok()?);
    let slice = buffer.slice_data(0).ok()?;

    macro_rules! build {
        ($values:expr, $l:ident, $la:ident, $rgb:ident, $rgba:ident) => {
            match buffer.components() {
                1 => DynamicImage::$l(ImageBuffer::from_raw(w, h, $values)?),
                2 => DynamicImage::$la(ImageBuffer::from_raw(w, h, $values)?),
                3 => DynamicImage::$rgb(ImageBuffer::from_raw(w, h, $values)?),
                4 => DynamicImage::$rgba(ImageBuffer::from_raw(w, h, $values)?),
                _ => return None,
            }
        };
    }

    let img = match slice {
        PixelData::U8(v) => build!(v, ImageLuma8, ImageLumaA8, ImageRgb8, ImageRgba8),
        PixelData::U16(v) => build!(v, ImageLuma16, ImageLumaA16, ImageRgb16, ImageRgba16),
        PixelData::I16(v) => {
            let v: Vec<u16> = v.into_iter().map(|x| x.max(0).unsigned_abs()).collect();
            build!(v, ImageLuma16, ImageLumaA16, ImageRgb16, ImageRgba16)
        }
        _ => return None,
    };
    Some(img)
}

/// Drop what the target encoder cannot store.
fn fit_to_encoder(format: RasterFormat, img: DynamicImage) -> DynamicImage {
    let color = img.color();
    let wide = color.bytes_per_pixel() > color.channel_count();
    let gray = color.channel_count() <= 2;
    let drop_depth = wide && !format.keeps_16bit();
    let drop_alpha = color.has_alpha() && !format.keeps_alpha();

    match (drop_depth, drop_alpha, gray) {
        (false, false, _) => img,
        (true, false, true) if color.has_alpha() => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        (true, false, true) => DynamicImage::ImageLuma8(img.to_luma8()),
        (true, false, false) if color.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        (true, false, false) => DynamicImage::ImageRgb8(img.to_rgb8()),
        (_, true, true) if wide && !drop_depth => DynamicImage::ImageLuma16(img.to_luma16()),
        (_, true, true) => DynamicImage::ImageLuma8(img.to_luma8()),
        (_, true, false) if wide && !drop_depth => DynamicImage::ImageRgb16(img.to_rgb16()),
        (_, true, false) => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

impl FormatReader for RasterFormat {
    fn descriptor(&self) -> FormatDescriptor {
        self.format_descriptor()
    }

    fn probe(&self) -> Option<&dyn FileProbe> {
        match self {
            RasterFormat::Tiff | RasterFormat::Pnm => Some(self),
            _ => None,
        }
    }

    fn read(&self, path: &Path, progress: &Progress) -> Result<DecodedImage, FormatError> {
        let reader = BufReader::new(File::open(path)?);
        let img = image::load(reader, self.image_format())
            .map_err(|e| FormatError::decode(path, self.id(), e))?;

        let (width, height) = (img.width() as usize, img.height() as usize);
        let (components, data) = to_pixel_data(img);
        let buffer = PixelBuffer::new([width, height, 1], components, data)
            .map_err(|e| FormatError::decode(path, self.id(), e))?;

        log::info!(
            "RasterFormat: loaded {}x{} {} image with {} components",
            width,
            height,
            self.id(),
            components
        );
        progress.report(1.0);
        Ok(DecodedImage::new(buffer))
    }
}

impl FormatWriter for RasterFormat {
    fn descriptor(&self) -> FormatDescriptor {
        self.format_descriptor()
    }

    fn write(
        &self,
        path: &Path,
        buffer: &PixelBuffer,
        _header: &EncodeHeader,
        progress: &Progress,
    ) -> Result<(), FormatError> {
        let [_, _, depth] = buffer.dimensions();
        if depth != 1 {
            return Err(FormatError::unsupported(format!(
                "{} stores a single slice, image has {}",
                self.id(),
                depth
            )));
        }

        let img = to_dynamic_image(buffer).ok_or_else(|| {
            FormatError::unsupported(format!(
                "{} cannot store {} data with {} components",
                self.id(),
                buffer.scalar_type().name(),
                buffer.components()
            ))
        })?;
        fit_to_encoder(*self, img)
            .save_with_format(path, self.image_format())
            .map_err(|e| FormatError::encode(path, self.id(), e))?;

        progress.report(1.0);
        log::info!("RasterFormat: wrote {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptors() {
        let png = RasterFormat::Png.format_descriptor();
        assert_eq!(png.display_name(), "PNG");
        assert!(png.capabilities.contains(Capabilities::DEPTH_16));
        assert!(!png.capabilities.contains(Capabilities::IMAGE_3D));

        let jpeg = RasterFormat::Jpeg.format_descriptor();
        assert!(!jpeg.capabilities.contains(Capabilities::DEPTH_16));
        assert_eq!(jpeg.extensions.len(), 2);
    }

    #[test]
    fn test_custom_probe_only_for_tiff_and_pnm() {
        assert!(RasterFormat::Png.probe().is_none());
        assert!(RasterFormat::Jpeg.probe().is_none());
        assert!(RasterFormat::Tiff.probe().is_some());
        assert!(RasterFormat::Pnm.probe().is_some());
    }

    #[test]
    fn test_fit_to_encoder_drops_alpha_for_jpeg() {
        let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(2, 2, image::Rgba([1, 2, 3, 4])));
        let fitted = fit_to_encoder(RasterFormat::Jpeg, img.clone());
        assert_eq!(fitted.color(), image::ColorType::Rgb8);

        let kept = fit_to_encoder(RasterFormat::Png, img);
        assert_eq!(kept.color(), image::ColorType::Rgba8);
    }

    #[test]
    fn test_fit_to_encoder_narrows_16bit_for_bmp() {
        let img = DynamicImage::ImageLuma16(ImageBuffer::from_pixel(2, 2, image::Luma([1000u16])));
        let fitted = fit_to_encoder(RasterFormat::Bmp, img);
        assert_eq!(fitted.color(), image::ColorType::L8);
    }
}
