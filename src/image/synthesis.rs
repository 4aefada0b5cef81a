//! Lazy header synthesis.
//!
//! The cache starts uninitialised. The first refresh asks the
//! [`HeaderDefaults`] collaborator for a base record, derives every
//! pixel-dependent element and generates per-slice positions. Later
//! refreshes only run when the buffer's modification stamp has moved past
//! the cached one, and only re-derive pixel-dependent elements.

use std::path::Path;

use crate::constants::DEFAULT_IMAGE_ORIENTATION;
use crate::header::{
    Element, FreeformHeader, HeaderDefaults, MetadataRecord, SliceHeaderOverlay, Tag,
    TagConversionError, Value, Vr, tags,
};
use crate::image::buffer::PixelBuffer;
use crate::image::stats::{percentile_range, window_from_range};

/// Inputs that stay fixed across refreshes.
pub(crate) struct SynthesisContext<'a> {
    pub defaults: &'a dyn HeaderDefaults,
    pub filename: Option<&'a Path>,
    pub percentiles: (f64, f64),
}

/// A synthesized header and the buffer stamp it reflects.
#[derive(Debug, Clone)]
pub(crate) struct SynthesizedHeader {
    pub stamp: u64,
    pub overlay: SliceHeaderOverlay,
}

#[derive(Debug, Clone)]
pub(crate) struct HeaderCache {
    /// `None` until first access.
    pub header: Option<SynthesizedHeader>,
    /// Free-form entries; replaced by the collaborator's leftovers on
    /// first synthesis.
    pub freeform: FreeformHeader,
}

impl HeaderCache {
    pub fn new(freeform: FreeformHeader) -> Self {
        Self {
            header: None,
            freeform,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.header.is_some()
    }

    /// Bring the cached header up to date with `buffer`.
    pub fn refresh(&mut self, buffer: &PixelBuffer, ctx: &SynthesisContext<'_>) -> &mut SliceHeaderOverlay {
        let init_required = self.header.is_none();
        let freeform = &mut self.freeform;
        let header = self
            .header
            .get_or_insert_with(|| initial_header(buffer, ctx, freeform));

        if header.stamp < buffer.mtime() {
            header.stamp = buffer.mtime();
            log::trace!("Re-deriving pixel-dependent header elements");
            derive_pixel_elements(header.overlay.base_mut(), buffer, ctx.percentiles);

            if init_required {
                generate_slice_overlays(
                    &mut header.overlay,
                    buffer.dimensions()[2],
                    buffer.spacing()[2],
                );
            }
        }

        &mut header.overlay
    }

    /// Copy another image's base elements over this header.
    ///
    /// Instance identity and slice placement stay this image's own, and so
    /// do its per-slice overlays. The stamp is reset so the next refresh
    /// re-derives pixel elements from this image's buffer. Does nothing
    /// before first synthesis.
    pub fn copy_base(&mut self, source: &MetadataRecord, freeform: FreeformHeader) {
        if let Some(header) = self.header.as_mut() {
            let mut copied = source.clone();
            for tag in SLICE_IDENTITY_TAGS {
                copied.remove(tag);
            }
            header.overlay.base_mut().apply(&copied);
            header.stamp = 0;
        }
        self.freeform.extend(freeform);
    }
}

/// Elements that identify or place a single image; never copied between
/// images.
const SLICE_IDENTITY_TAGS: [Tag; 4] = [
    tags::SOP_INSTANCE_UID,
    tags::INSTANCE_NUMBER,
    tags::IMAGE_POSITION_PATIENT,
    tags::SLICE_LOCATION,
];

/// Base record from the defaults collaborator plus the default orientation.
fn initial_header(
    buffer: &PixelBuffer,
    ctx: &SynthesisContext<'_>,
    freeform: &mut FreeformHeader,
) -> SynthesizedHeader {
    log::debug!(
        "Synthesizing header for {}",
        ctx.filename
            .map_or_else(|| "<memory>".to_string(), |p| p.display().to_string())
    );
    let out = ctx
        .defaults
        .defaults(&buffer.descriptor(), ctx.filename, freeform);
    let mut record = out.record;
    *freeform = out.leftovers;

    if !record.contains(tags::IMAGE_ORIENTATION_PATIENT) {
        log_tag(record.set(
            tags::IMAGE_ORIENTATION_PATIENT,
            DEFAULT_IMAGE_ORIENTATION.to_vec(),
        ));
    }

    SynthesizedHeader {
        stamp: 0,
        overlay: SliceHeaderOverlay::new(record),
    }
}

fn log_tag(result: Result<impl Sized, TagConversionError>) {
    if let Err(e) = result {
        log::warn!("Skipping header element: {}", e);
    }
}

/// Structural and statistical elements that follow the pixel data.
pub(crate) fn derive_pixel_elements(
    record: &mut MetadataRecord,
    buffer: &PixelBuffer,
    percentiles: (f64, f64),
) {
    let scalar_type = buffer.scalar_type();
    let bits = (scalar_type.size() * 8) as i64;
    let [columns, rows, _] = buffer.dimensions();

    log_tag(record.set(tags::BITS_ALLOCATED, bits));
    log_tag(record.set(tags::BITS_STORED, bits));
    log_tag(record.set(tags::HIGH_BIT, bits - 1));
    log_tag(record.set(
        tags::PIXEL_REPRESENTATION,
        i64::from(scalar_type.is_signed()),
    ));
    log_tag(record.set(tags::COLUMNS, columns as i64));
    log_tag(record.set(tags::ROWS, rows as i64));

    let data = buffer.data();
    let Some((min, max)) = data.range() else {
        return;
    };

    if scalar_type.is_integer() {
        let vr = if scalar_type.is_signed() { Vr::SS } else { Vr::US };
        // Always follows the pixels, even over a caller-set value
        for (tag, value) in [
            (tags::SMALLEST_PIXEL_VALUE_IN_SERIES, min),
            (tags::LARGEST_PIXEL_VALUE_IN_SERIES, max),
        ] {
            log_tag(record.insert(
                tag,
                Element {
                    vr,
                    value: Value::from(value as i64),
                    derived: true,
                },
            ));
        }
    }

    let window_is_free = !record.contains(tags::WINDOW_CENTER)
        || record.is_derived(tags::WINDOW_CENTER);
    let rescale = record.rescale_slope().zip(record.rescale_intercept());

    if let (true, Some((slope, intercept))) = (window_is_free, rescale) {
        let (low, high) = percentiles;
        if let Some(range) = percentile_range(data, low, high) {
            let (center, width) = window_from_range(range, slope, intercept);
            log_tag(record.set_derived(tags::WINDOW_CENTER, Vr::DS, center));
            log_tag(record.set_derived(tags::WINDOW_WIDTH, Vr::DS, width));
        }
    }
}

fn split_uid(uid: &str) -> Result<(&str, u64), TagConversionError> {
    let (prefix, last) = uid
        .rsplit_once('.')
        .ok_or_else(|| TagConversionError::new("SOPInstanceUID", format!("'{}' has no components", uid)))?;
    let number = last.parse::<u64>().map_err(|_| {
        TagConversionError::new(
            "SOPInstanceUID",
            format!("'{}' does not end in a number", uid),
        )
    })?;
    Ok((prefix, number))
}

/// Give each slice its own instance number, instance UID and position.
///
/// Slice `i` sits at the base z position plus `i * z_spacing`. The base
/// record's instance UID is removed afterwards; only slices carry one.
pub(crate) fn generate_slice_overlays(overlay: &mut SliceHeaderOverlay, depth: usize, z_spacing: f64) {
    overlay.clear_slices();
    let base = overlay.base().clone();

    let instance = base.instance_number();
    let uid = base.sop_instance_uid();
    let uid_parts = uid.as_deref().map(split_uid);
    if let Some(Err(e)) = &uid_parts {
        log::warn!("Not numbering slice UIDs: {}", e);
    }
    let position = base.image_position().filter(|p| p.len() >= 3);

    for i in 0..depth {
        if let Some(number) = instance {
            log_tag(overlay.set_slice_tag(i, tags::INSTANCE_NUMBER, Vr::IS, number + i as i64));
        }

        if let Some(Ok((prefix, number))) = &uid_parts {
            let slice_uid = format!("{}.{}", prefix, number + i as u64);
            log_tag(overlay.set_slice_tag(i, tags::SOP_INSTANCE_UID, Vr::UI, slice_uid));
        }

        if let Some(base_position) = &position {
            let mut slice_position = base_position.clone();
            slice_position[2] = base_position[2] + z_spacing * i as f64;
            let z = slice_position[2];
            log_tag(overlay.set_slice_tag(
                i,
                tags::IMAGE_POSITION_PATIENT,
                Vr::DS,
                Value::Floats(slice_position),
            ));
            log_tag(overlay.set_slice_tag(i, tags::SLICE_LOCATION, Vr::DS, z));
        }
    }

    overlay.base_mut().remove(tags::SOP_INSTANCE_UID);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::buffer::{PixelData, ScalarType};

    #[test]
    fn test_structural_elements() {
        let buffer = PixelBuffer::new([3, 2, 1], 1, PixelData::I16(vec![-5, 0, 1, 2, 3, 40])).unwrap();
        let mut record = MetadataRecord::new();
        derive_pixel_elements(&mut record, &buffer, (1.0, 99.0));

        assert_eq!(record.bits_allocated(), Some(16));
        assert_eq!(record.i64(tags::HIGH_BIT), Some(15));
        assert_eq!(record.pixel_representation(), Some(1));
        assert_eq!(record.columns(), Some(3));
        assert_eq!(record.rows(), Some(2));
        assert_eq!(record.i64(tags::SMALLEST_PIXEL_VALUE_IN_SERIES), Some(-5));
        assert_eq!(record.i64(tags::LARGEST_PIXEL_VALUE_IN_SERIES), Some(40));
        assert_eq!(
            record.get(tags::SMALLEST_PIXEL_VALUE_IN_SERIES).unwrap().vr,
            Vr::SS
        );
        // No rescale tags, no window
        assert!(!record.contains(tags::WINDOW_CENTER));
    }

    #[test]
    fn test_float_data_has_no_range_tags() {
        let buffer = PixelBuffer::new([2, 1, 1], 1, PixelData::F32(vec![0.5, 1.5])).unwrap();
        let mut record = MetadataRecord::new();
        derive_pixel_elements(&mut record, &buffer, (1.0, 99.0));
        assert_eq!(record.bits_allocated(), Some(32));
        assert!(!record.contains(tags::SMALLEST_PIXEL_VALUE_IN_SERIES));
    }

    #[test]
    fn test_window_needs_rescale_tags() {
        let buffer = PixelBuffer::new([4, 1, 1], 1, PixelData::U16(vec![0, 100, 200, 300])).unwrap();
        let mut record = MetadataRecord::new();
        record.set(tags::RESCALE_SLOPE, 1.0).unwrap();
        record.set(tags::RESCALE_INTERCEPT, -100.0).unwrap();
        derive_pixel_elements(&mut record, &buffer, (0.0, 100.0));

        assert_eq!(record.window_center(), Some(50.0));
        assert_eq!(record.window_width(), Some(300.0));
        assert!(record.is_derived(tags::WINDOW_CENTER));
    }

    #[test]
    fn test_empty_buffer_skips_statistics() {
        let buffer = PixelBuffer::zeros([0, 0, 0], 1, ScalarType::U8);
        let mut record = MetadataRecord::new();
        derive_pixel_elements(&mut record, &buffer, (1.0, 99.0));
        assert_eq!(record.bits_allocated(), Some(8));
        assert!(!record.contains(tags::LARGEST_PIXEL_VALUE_IN_SERIES));
    }

    #[test]
    fn test_slice_overlays() {
        let mut base = MetadataRecord::new();
        base.set(tags::INSTANCE_NUMBER, 1_i64).unwrap();
        base.set(tags::SOP_INSTANCE_UID, "1.2.3.41").unwrap();
        base.set(tags::IMAGE_POSITION_PATIENT, vec![0.0, 0.0, 10.0]).unwrap();

        let mut overlay = SliceHeaderOverlay::new(base);
        generate_slice_overlays(&mut overlay, 3, 2.5);

        assert!(!overlay.base().contains(tags::SOP_INSTANCE_UID));
        let last = overlay.get(2);
        assert_eq!(last.instance_number(), Some(3));
        assert_eq!(last.sop_instance_uid().as_deref(), Some("1.2.3.43"));
        assert_eq!(last.image_position(), Some(vec![0.0, 0.0, 15.0]));
        assert_eq!(last.f64(tags::SLICE_LOCATION), Some(15.0));
    }

    #[test]
    fn test_non_numeric_uid_is_skipped() {
        let mut base = MetadataRecord::new();
        base.set(tags::SOP_INSTANCE_UID, "1.2.abc").unwrap();
        base.set(tags::IMAGE_POSITION_PATIENT, vec![0.0, 0.0, 0.0]).unwrap();

        let mut overlay = SliceHeaderOverlay::new(base);
        generate_slice_overlays(&mut overlay, 2, 1.0);

        assert!(overlay.get(1).sop_instance_uid().is_none());
        assert_eq!(overlay.get(1).f64(tags::SLICE_LOCATION), Some(1.0));
    }
}
